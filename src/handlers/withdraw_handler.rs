//! Withdraw Handler
//!
//! Spends points against a fresh order number. The withdrawal order and the
//! debit commit together; any failure leaves both tables untouched.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::{Amount, ChecksumPolicy, DomainError, Order, OrderNumber};
use crate::error::AppError;
use crate::ledger;
use crate::store::{Store, StoreTx};

use super::{WithdrawCommand, WithdrawResult};

/// Handler for withdrawals
pub struct WithdrawHandler<S: Store> {
    store: Arc<S>,
    checksum: ChecksumPolicy,
}

impl<S: Store> WithdrawHandler<S> {
    pub fn new(store: Arc<S>, checksum: ChecksumPolicy) -> Self {
        Self { store, checksum }
    }

    /// Execute the withdraw command
    pub async fn execute(&self, command: WithdrawCommand) -> Result<WithdrawResult, AppError> {
        let number = OrderNumber::parse(&command.order)?;
        self.checksum.validate(&number)?;

        let sum = Amount::from_major(command.sum)
            .map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

        let mut tx = self.store.begin().await?;

        // Order row first, then the account row
        if tx.lock_order(&number).await?.is_some() {
            return Err(DomainError::OrderNumberTaken(number.to_string()).into());
        }
        let order = Order::withdrawal(number.clone(), command.login.as_str(), sum, Utc::now());
        if !tx.insert_order(&order).await? {
            return Err(DomainError::OrderNumberTaken(number.to_string()).into());
        }

        let account = ledger::debit_in(&mut tx, &command.login, sum.minor()).await?;
        tx.commit().await?;

        tracing::info!(
            order = %number,
            login = %command.login,
            sum = sum.minor(),
            "Withdrawal processed"
        );

        Ok(WithdrawResult {
            order: number,
            sum,
            account,
        })
    }
}
