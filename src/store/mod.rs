//! Store module
//!
//! Transactional persistence over the `accounts` and `orders` relations.
//! The ledger and the reconciliation engine only talk to these traits;
//! [`PgStore`] backs production and [`MemoryStore`] backs tests and local runs.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{Account, Order, OrderNumber, OrderState};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Connection-level store operations.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Number of purchase orders still in `NEW` or `PROCESSING`, oldest first
    async fn load_unsettled_orders(&self, limit: i64) -> Result<Vec<OrderNumber>, StoreError>;

    async fn load_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;

    async fn load_account(&self, login: &str) -> Result<Option<Account>, StoreError>;

    /// Insert an empty account; `false` if the login is taken
    async fn create_account(&self, login: &str) -> Result<bool, StoreError>;

    /// Purchase orders of `owner`, newest first
    async fn list_orders(&self, owner: &str) -> Result<Vec<Order>, StoreError>;

    /// Withdrawal orders of `owner`, newest first
    async fn list_withdrawals(&self, owner: &str) -> Result<Vec<Order>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Operations inside one transaction.
///
/// `lock_*` methods take an exclusive row lock held until the transaction
/// ends. Callers lock the order row before the account row.
#[async_trait]
pub trait StoreTx: Send {
    async fn lock_order(&mut self, number: &OrderNumber) -> Result<Option<Order>, StoreError>;

    /// `false` if an order with this number already exists
    async fn insert_order(&mut self, order: &Order) -> Result<bool, StoreError>;

    /// Set state and accrual, only while the order is still non-terminal.
    /// Returns the updated row, or `None` if the guard did not match.
    async fn update_order_state(
        &mut self,
        number: &OrderNumber,
        state: OrderState,
        accrual: i64,
    ) -> Result<Option<Order>, StoreError>;

    async fn lock_account(&mut self, login: &str) -> Result<Option<Account>, StoreError>;

    /// Add to `credited_total`. `None` if the account does not exist.
    async fn credit_account(
        &mut self,
        login: &str,
        amount: i64,
    ) -> Result<Option<Account>, StoreError>;

    /// Add to `debited_total`, only if the available balance covers `amount`.
    /// `None` if the guard did not match or the account does not exist.
    async fn debit_account(
        &mut self,
        login: &str,
        amount: i64,
    ) -> Result<Option<Account>, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
