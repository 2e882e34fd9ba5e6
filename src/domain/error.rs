//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::OrderState;

/// Business rule violations and domain invariant failures.
///
/// These are surfaced to callers as distinguishable outcomes and are never
/// retried automatically.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Zero, negative or out-of-range amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit larger than the available balance
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// Order number is not a string of digits
    #[error("Invalid order number format: {0}")]
    InvalidOrderNumber(String),

    /// Order number fails the checksum
    #[error("Order number fails checksum: {0}")]
    InvalidChecksum(String),

    /// Order number already belongs to another account
    #[error("Order {number} belongs to another account")]
    OrderConflict { number: String },

    /// Number already used by an existing order
    #[error("Order number already used: {0}")]
    OrderNumberTaken(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Illegal order transition: {from} -> {to}")]
    IllegalTransition { from: OrderState, to: OrderState },

    #[error("Unknown order state: {0}")]
    UnknownOrderState(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Check if this is a conflict with existing state
    pub fn is_conflict_error(&self) -> bool {
        matches!(
            self,
            Self::OrderConflict { .. } | Self::OrderNumberTaken(_) | Self::AccountExists(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(100, 50);

        assert!(!err.is_conflict_error());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_conflict_errors() {
        assert!(DomainError::OrderConflict {
            number: "79927398713".to_string()
        }
        .is_conflict_error());
        assert!(DomainError::OrderNumberTaken("1".to_string()).is_conflict_error());
        assert!(!DomainError::InvalidChecksum("1".to_string()).is_conflict_error());
    }
}
