//! Ledger Errors

use crate::domain::DomainError;
use crate::store::StoreError;

/// Errors returned by ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Business rule rejected the operation
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persistence failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Store failure that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_transient())
    }
}
