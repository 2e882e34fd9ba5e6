//! Command definitions
//!
//! Commands represent intentions to change the system state. Identity
//! (`login`) is always an explicit field, taken from the authenticated
//! request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Account, Amount, OrderNumber};

// =========================================================================
// RegisterCommand
// =========================================================================

/// Command to open an account for a new login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCommand {
    pub login: String,
}

impl RegisterCommand {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

// =========================================================================
// SubmitOrderCommand
// =========================================================================

/// Command to register a purchase order for settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderCommand {
    pub login: String,
    /// Order number as received; validated by the handler
    pub number: String,
}

impl SubmitOrderCommand {
    pub fn new(login: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            number: number.into(),
        }
    }
}

/// Result of a purchase-order submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New order stored in `NEW`
    Accepted,
    /// Same owner already submitted this number; nothing changed
    AlreadyAccepted,
}

// =========================================================================
// WithdrawCommand
// =========================================================================

/// Command to spend points against a new order number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub login: String,
    pub order: String,
    /// Amount in major units
    pub sum: Decimal,
}

impl WithdrawCommand {
    pub fn new(login: impl Into<String>, order: impl Into<String>, sum: Decimal) -> Self {
        Self {
            login: login.into(),
            order: order.into(),
            sum,
        }
    }
}

/// Result of a successful withdrawal
#[derive(Debug, Clone)]
pub struct WithdrawResult {
    pub order: OrderNumber,
    pub sum: Amount,
    /// Account totals after the debit
    pub account: Account,
}
