//! Postgres store
//!
//! Row locks are `SELECT ... FOR UPDATE`; guarded updates repeat their
//! precondition in the `WHERE` clause so they stay correct even without
//! the lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Account, Order, OrderNumber, OrderState};

use super::{Store, StoreError, StoreTx};

type OrderRow = (String, String, String, i64, i64, DateTime<Utc>);
type AccountRow = (String, i64, i64);

const ORDER_COLUMNS: &str =
    "order_number, owner, state, accrual_amount, withdrawal_amount, created_at";

fn order_from_row(row: OrderRow) -> Result<Order, StoreError> {
    let (number, owner, state, accrual, withdrawal, created_at) = row;
    Ok(Order {
        number: OrderNumber::parse(&number)
            .map_err(|_| StoreError::CorruptRow(format!("order_number {}", number)))?,
        owner,
        state: state
            .parse()
            .map_err(|_| StoreError::CorruptRow(format!("state {} for {}", state, number)))?,
        accrual,
        withdrawal,
        created_at,
    })
}

fn account_from_row((login, credited_total, debited_total): AccountRow) -> Account {
    Account {
        login,
        credited_total,
        debited_total,
    }
}

/// Store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgStoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgStoreTx { tx })
    }

    async fn load_unsettled_orders(&self, limit: i64) -> Result<Vec<OrderNumber>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT order_number FROM orders
            WHERE state IN ('NEW', 'PROCESSING') AND withdrawal_amount = 0
            ORDER BY created_at, order_number
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(number,)| {
                OrderNumber::parse(&number)
                    .map_err(|_| StoreError::CorruptRow(format!("order_number {}", number)))
            })
            .collect()
    }

    async fn load_order(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE order_number = $1",
            ORDER_COLUMNS
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(order_from_row).transpose()
    }

    async fn load_account(&self, login: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT login, credited_total, debited_total FROM accounts WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(account_from_row))
    }

    async fn create_account(&self, login: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (login, credited_total, debited_total)
            VALUES ($1, 0, 0)
            ON CONFLICT (login) DO NOTHING
            "#,
        )
        .bind(login)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_orders(&self, owner: &str) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM orders
            WHERE owner = $1 AND withdrawal_amount = 0
            ORDER BY created_at DESC, order_number DESC
            "#,
            ORDER_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }

    async fn list_withdrawals(&self, owner: &str) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM orders
            WHERE owner = $1 AND withdrawal_amount > 0
            ORDER BY created_at DESC, order_number DESC
            "#,
            ORDER_COLUMNS
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open Postgres transaction
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_order(&mut self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE order_number = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(number.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(order_from_row).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<bool, StoreError> {
        // Concurrent inserts of the same number block on the primary key
        // until the first transaction ends, then fall into DO NOTHING.
        let result = sqlx::query(
            r#"
            INSERT INTO orders
                (order_number, owner, state, accrual_amount, withdrawal_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_number) DO NOTHING
            "#,
        )
        .bind(order.number.as_str())
        .bind(&order.owner)
        .bind(order.state.as_str())
        .bind(order.accrual)
        .bind(order.withdrawal)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_order_state(
        &mut self,
        number: &OrderNumber,
        state: OrderState,
        accrual: i64,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r#"
            UPDATE orders
            SET state = $2, accrual_amount = $3
            WHERE order_number = $1 AND state IN ('NEW', 'PROCESSING')
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(number.as_str())
        .bind(state.as_str())
        .bind(accrual)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(order_from_row).transpose()
    }

    async fn lock_account(&mut self, login: &str) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT login, credited_total, debited_total FROM accounts WHERE login = $1 FOR UPDATE",
        )
        .bind(login)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(account_from_row))
    }

    async fn credit_account(
        &mut self,
        login: &str,
        amount: i64,
    ) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET credited_total = credited_total + $2
            WHERE login = $1
            RETURNING login, credited_total, debited_total
            "#,
        )
        .bind(login)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(account_from_row))
    }

    async fn debit_account(
        &mut self,
        login: &str,
        amount: i64,
    ) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET debited_total = debited_total + $2
            WHERE login = $1 AND credited_total - debited_total >= $2
            RETURNING login, credited_total, debited_total
            "#,
        )
        .bind(login)
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(account_from_row))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
