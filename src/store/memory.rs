//! In-memory store
//!
//! Mirrors the Postgres adapter's semantics: every transaction takes
//! per-row async locks (one per login, one per order number) that it holds
//! until commit or drop, and keeps its writes staged until commit. Readers
//! outside a transaction only ever see committed rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::domain::{Account, Order, OrderNumber, OrderState};

use super::{Store, StoreError, StoreTx};

/// Lock a table mutex; a panicked writer never leaves a half-applied row
fn table<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One async mutex per row key, created on first use
struct RowLocks<K> {
    rows: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> RowLocks<K> {
    fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = table(&self.rows).entry(key.clone()).or_default().clone();
        lock.lock_owned().await
    }
}

struct Tables {
    accounts: Mutex<HashMap<String, Account>>,
    orders: Mutex<HashMap<OrderNumber, Order>>,
    account_locks: RowLocks<String>,
    order_locks: RowLocks<OrderNumber>,
}

/// Store held entirely in process memory
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Tables {
                accounts: Mutex::new(HashMap::new()),
                orders: Mutex::new(HashMap::new()),
                account_locks: RowLocks::new(),
                order_locks: RowLocks::new(),
            }),
        }
    }

    fn select_orders(&self, owner: &str, withdrawals: bool) -> Vec<Order> {
        let mut orders: Vec<Order> = table(&self.tables.orders)
            .values()
            .filter(|o| o.owner == owner && o.is_withdrawal() == withdrawals)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.number.cmp(&a.number))
        });
        orders
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx {
            tables: self.tables.clone(),
            guards: Vec::new(),
            locked_accounts: HashSet::new(),
            locked_orders: HashSet::new(),
            staged_accounts: HashMap::new(),
            staged_orders: HashMap::new(),
        })
    }

    async fn load_unsettled_orders(&self, limit: i64) -> Result<Vec<OrderNumber>, StoreError> {
        let mut pending: Vec<(DateTime<Utc>, OrderNumber)> = table(&self.tables.orders)
            .values()
            .filter(|o| !o.state.is_terminal() && !o.is_withdrawal())
            .map(|o| (o.created_at, o.number.clone()))
            .collect();
        pending.sort();

        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(pending.into_iter().take(limit).map(|(_, number)| number).collect())
    }

    async fn load_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        Ok(table(&self.tables.orders).get(number).cloned())
    }

    async fn load_account(&self, login: &str) -> Result<Option<Account>, StoreError> {
        Ok(table(&self.tables.accounts).get(login).cloned())
    }

    async fn create_account(&self, login: &str) -> Result<bool, StoreError> {
        let mut accounts = table(&self.tables.accounts);
        if accounts.contains_key(login) {
            return Ok(false);
        }
        accounts.insert(login.to_string(), Account::new(login));
        Ok(true)
    }

    async fn list_orders(&self, owner: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self.select_orders(owner, false))
    }

    async fn list_withdrawals(&self, owner: &str) -> Result<Vec<Order>, StoreError> {
        Ok(self.select_orders(owner, true))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Open in-memory transaction
pub struct MemoryTx {
    tables: Arc<Tables>,
    guards: Vec<OwnedMutexGuard<()>>,
    locked_accounts: HashSet<String>,
    locked_orders: HashSet<OrderNumber>,
    staged_accounts: HashMap<String, Account>,
    staged_orders: HashMap<OrderNumber, Order>,
}

impl MemoryTx {
    async fn hold_order(&mut self, number: &OrderNumber) {
        if self.locked_orders.insert(number.clone()) {
            let guard = self.tables.order_locks.acquire(number).await;
            self.guards.push(guard);
        }
    }

    async fn hold_account(&mut self, login: &str) {
        if self.locked_accounts.insert(login.to_string()) {
            let guard = self.tables.account_locks.acquire(&login.to_string()).await;
            self.guards.push(guard);
        }
    }

    fn current_order(&self, number: &OrderNumber) -> Option<Order> {
        self.staged_orders
            .get(number)
            .cloned()
            .or_else(|| table(&self.tables.orders).get(number).cloned())
    }

    fn current_account(&self, login: &str) -> Option<Account> {
        self.staged_accounts
            .get(login)
            .cloned()
            .or_else(|| table(&self.tables.accounts).get(login).cloned())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_order(&mut self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        self.hold_order(number).await;
        Ok(self.current_order(number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<bool, StoreError> {
        self.hold_order(&order.number).await;
        if self.current_order(&order.number).is_some() {
            return Ok(false);
        }
        self.staged_orders.insert(order.number.clone(), order.clone());
        Ok(true)
    }

    async fn update_order_state(
        &mut self,
        number: &OrderNumber,
        state: OrderState,
        accrual: i64,
    ) -> Result<Option<Order>, StoreError> {
        self.hold_order(number).await;
        let Some(mut order) = self.current_order(number) else {
            return Ok(None);
        };
        if order.state.is_terminal() {
            return Ok(None);
        }
        order.state = state;
        order.accrual = accrual;
        self.staged_orders.insert(number.clone(), order.clone());
        Ok(Some(order))
    }

    async fn lock_account(&mut self, login: &str) -> Result<Option<Account>, StoreError> {
        self.hold_account(login).await;
        Ok(self.current_account(login))
    }

    async fn credit_account(
        &mut self,
        login: &str,
        amount: i64,
    ) -> Result<Option<Account>, StoreError> {
        self.hold_account(login).await;
        let Some(mut account) = self.current_account(login) else {
            return Ok(None);
        };
        account.credited_total += amount;
        self.staged_accounts.insert(login.to_string(), account.clone());
        Ok(Some(account))
    }

    async fn debit_account(
        &mut self,
        login: &str,
        amount: i64,
    ) -> Result<Option<Account>, StoreError> {
        self.hold_account(login).await;
        let Some(mut account) = self.current_account(login) else {
            return Ok(None);
        };
        if account.credited_total - account.debited_total < amount {
            return Ok(None);
        }
        account.debited_total += amount;
        self.staged_accounts.insert(login.to_string(), account.clone());
        Ok(Some(account))
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        // Apply while the row guards are still held; they drop with `self`.
        // Both tables change in one critical section; orders lock first.
        {
            let mut orders = table(&self.tables.orders);
            let mut accounts = table(&self.tables.accounts);
            orders.extend(self.staged_orders.drain());
            accounts.extend(self.staged_accounts.drain());
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        store.create_account("alice").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.credit_account("alice", 500).await.unwrap();
        tx.insert_order(&Order::purchase(number("79927398713"), "alice", Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.load_account("alice").await.unwrap().unwrap().credited_total, 0);
        assert!(store.load_order(&number("79927398713")).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.load_account("alice").await.unwrap().unwrap().credited_total, 500);
        assert!(store.load_order(&number("79927398713")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        store.create_account("alice").await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.credit_account("alice", 500).await.unwrap();
        }

        assert_eq!(store.load_account("alice").await.unwrap().unwrap().credited_total, 0);
        // The row lock was released with the transaction
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_account("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_transaction() {
        let store = MemoryStore::new();
        store.create_account("alice").await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_account("alice").await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            second.lock_account("alice").await.unwrap().unwrap()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.credit_account("alice", 70).await.unwrap();
        first.commit().await.unwrap();

        // The waiter observes the committed write
        let seen = waiter.await.unwrap();
        assert_eq!(seen.credited_total, 70);
    }

    #[tokio::test]
    async fn test_different_accounts_do_not_block() {
        let store = MemoryStore::new();
        store.create_account("alice").await.unwrap();
        store.create_account("bob").await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_account("alice").await.unwrap();

        let mut second = store.begin().await.unwrap();
        let bob = tokio::time::timeout(Duration::from_millis(100), second.lock_account("bob"))
            .await
            .expect("lock on a different account must not wait");
        assert!(bob.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_guarded_debit() {
        let store = MemoryStore::new();
        store.create_account("alice").await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.credit_account("alice", 150).await.unwrap();
        assert!(tx.debit_account("alice", 200).await.unwrap().is_none());
        let account = tx.debit_account("alice", 150).await.unwrap().unwrap();
        assert_eq!(account.available().minor(), 0);
    }

    #[tokio::test]
    async fn test_update_order_state_guard() {
        let store = MemoryStore::new();
        let n = number("79927398713");

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::purchase(n.clone(), "alice", Utc::now())).await.unwrap();
        let updated = tx
            .update_order_state(&n, OrderState::Processed, 500)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.accrual, 500);

        // Terminal now: the guard rejects any further write
        assert!(tx
            .update_order_state(&n, OrderState::Invalid, 0)
            .await
            .unwrap()
            .is_none());
        assert!(tx
            .update_order_state(&number("4561261212345467"), OrderState::Processed, 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_number() {
        let store = MemoryStore::new();
        let n = number("79927398713");

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_order(&Order::purchase(n.clone(), "alice", Utc::now())).await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.insert_order(&Order::purchase(n, "bob", Utc::now())).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsettled_orders_exclude_terminal_and_withdrawals() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::purchase(number("1"), "alice", now)).await.unwrap();
        tx.insert_order(&Order::purchase(number("2"), "alice", now + chrono::Duration::seconds(1)))
            .await
            .unwrap();
        tx.update_order_state(&number("2"), OrderState::Processing, 0).await.unwrap();
        tx.insert_order(&Order::purchase(number("3"), "alice", now)).await.unwrap();
        tx.update_order_state(&number("3"), OrderState::Invalid, 0).await.unwrap();
        tx.insert_order(&Order::withdrawal(
            number("4"),
            "alice",
            crate::domain::Amount::new(10).unwrap(),
            now,
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let unsettled = store.load_unsettled_orders(100).await.unwrap();
        assert_eq!(unsettled, vec![number("1"), number("2")]);
        assert_eq!(store.load_unsettled_orders(1).await.unwrap(), vec![number("1")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_settled_order_visible_only_with_its_credit() {
        let store = MemoryStore::new();
        store.create_account("alice").await.unwrap();

        for i in 1..=100i64 {
            let n = number(&i.to_string());
            let mut tx = store.begin().await.unwrap();
            tx.insert_order(&Order::purchase(n.clone(), "alice", Utc::now()))
                .await
                .unwrap();
            tx.commit().await.unwrap();

            let writer = store.clone();
            let settled = n.clone();
            let handle = tokio::spawn(async move {
                let mut tx = writer.begin().await.unwrap();
                tx.lock_order(&settled).await.unwrap();
                tx.update_order_state(&settled, OrderState::Processed, 1)
                    .await
                    .unwrap();
                tx.credit_account("alice", 1).await.unwrap();
                tx.commit().await.unwrap();
            });

            loop {
                let order = store.load_order(&n).await.unwrap().unwrap();
                if order.state == OrderState::Processed {
                    let account = store.load_account("alice").await.unwrap().unwrap();
                    assert_eq!(account.credited_total, i);
                    break;
                }
                tokio::task::yield_now().await;
            }
            handle.await.unwrap();
        }
    }
}
