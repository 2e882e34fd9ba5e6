//! Balance ledger
//!
//! The only path by which account totals change. Operations on one account
//! serialize on its row lock; operations on different accounts never wait on
//! each other.
//!
//! The `*_in` forms run inside a caller's transaction so the balance change
//! commits or rolls back together with whatever else the caller wrote.

mod error;

use std::sync::Arc;

use crate::domain::{Account, Amount, DomainError};
use crate::store::{Store, StoreTx};

pub use error::LedgerError;

fn positive(amount: i64) -> Result<Amount, DomainError> {
    Amount::new(amount).map_err(|e| DomainError::InvalidAmount(e.to_string()))
}

/// Add `amount` minor units to the account's `credited_total`.
pub async fn credit_in<T: StoreTx>(
    tx: &mut T,
    login: &str,
    amount: i64,
) -> Result<Account, LedgerError> {
    let amount = positive(amount)?;

    tx.lock_account(login)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(login.to_string()))?;

    let account = tx
        .credit_account(login, amount.minor())
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(login.to_string()))?;

    tracing::debug!(login = %login, amount = amount.minor(), "Account credited");
    Ok(account)
}

/// Add `amount` minor units to the account's `debited_total`, only if the
/// available balance covers it.
pub async fn debit_in<T: StoreTx>(
    tx: &mut T,
    login: &str,
    amount: i64,
) -> Result<Account, LedgerError> {
    let amount = positive(amount)?;

    let account = tx
        .lock_account(login)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(login.to_string()))?;

    let available = account.available();
    if !available.is_sufficient_for(&amount) {
        return Err(DomainError::insufficient_funds(amount.minor(), available.minor()).into());
    }

    // The UPDATE repeats the balance check; `None` means it lost anyway.
    let account = tx
        .debit_account(login, amount.minor())
        .await?
        .ok_or_else(|| DomainError::insufficient_funds(amount.minor(), available.minor()))?;

    tracing::debug!(login = %login, amount = amount.minor(), "Account debited");
    Ok(account)
}

/// Standalone ledger operations, each in its own transaction
pub struct Ledger<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn credit(&self, login: &str, amount: i64) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin().await?;
        let account = credit_in(&mut tx, login, amount).await?;
        tx.commit().await?;
        Ok(account)
    }

    pub async fn debit(&self, login: &str, amount: i64) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin().await?;
        let account = debit_in(&mut tx, login, amount).await?;
        tx.commit().await?;
        Ok(account)
    }

    /// Current committed totals
    pub async fn balance(&self, login: &str) -> Result<Account, LedgerError> {
        self.store
            .load_account(login)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(login.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn ledger_with(login: &str) -> Ledger<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_account(login).await.unwrap();
        Ledger::new(store)
    }

    #[tokio::test]
    async fn test_credit_and_debit() {
        let ledger = ledger_with("alice").await;

        ledger.credit("alice", 150).await.unwrap();
        let account = ledger.debit("alice", 100).await.unwrap();

        assert_eq!(account.credited_total, 150);
        assert_eq!(account.debited_total, 100);
        assert_eq!(ledger.balance("alice").await.unwrap().available().minor(), 50);
    }

    #[tokio::test]
    async fn test_debit_insufficient_funds() {
        let ledger = ledger_with("alice").await;
        ledger.credit("alice", 50).await.unwrap();

        let err = ledger.debit("alice", 100).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(DomainError::InsufficientFunds {
                required: 100,
                available: 50
            })
        ));
        assert_eq!(ledger.balance("alice").await.unwrap().debited_total, 0);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_amounts() {
        let ledger = ledger_with("alice").await;

        for amount in [0, -5] {
            assert!(matches!(
                ledger.credit("alice", amount).await,
                Err(LedgerError::Domain(DomainError::InvalidAmount(_)))
            ));
            assert!(matches!(
                ledger.debit("alice", amount).await,
                Err(LedgerError::Domain(DomainError::InvalidAmount(_)))
            ));
        }
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let ledger = ledger_with("alice").await;

        assert!(matches!(
            ledger.credit("bob", 10).await,
            Err(LedgerError::Domain(DomainError::AccountNotFound(_)))
        ));
        assert!(matches!(
            ledger.balance("bob").await,
            Err(LedgerError::Domain(DomainError::AccountNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_rolled_back_credit_leaves_no_trace() {
        let store = Arc::new(MemoryStore::new());
        store.create_account("alice").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        credit_in(&mut tx, "alice", 500).await.unwrap();
        tx.rollback().await.unwrap();

        let account = store.load_account("alice").await.unwrap().unwrap();
        assert_eq!(account.credited_total, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let ledger = ledger_with("alice").await;
        ledger.credit("alice", 1_000).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..25 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move { ledger.debit("alice", 70).await }));
        }

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::Domain(DomainError::InsufficientFunds { .. })) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        // 1000 / 70 = 14 debits fit
        assert_eq!(succeeded, 14);
        let account = ledger.balance("alice").await.unwrap();
        assert_eq!(account.available().minor(), 20);
        assert_eq!(account.debited_total, 980);
    }
}
