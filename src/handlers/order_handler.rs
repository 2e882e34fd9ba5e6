//! Order Submission Handler
//!
//! Registers purchase orders for settlement.

use chrono::Utc;
use std::sync::Arc;

use crate::domain::{ChecksumPolicy, DomainError, Order, OrderNumber};
use crate::error::AppError;
use crate::store::{Store, StoreTx};

use super::{SubmitOrderCommand, SubmitOutcome};

/// Handler for purchase-order submission
pub struct SubmitOrderHandler<S: Store> {
    store: Arc<S>,
    checksum: ChecksumPolicy,
}

impl<S: Store> SubmitOrderHandler<S> {
    pub fn new(store: Arc<S>, checksum: ChecksumPolicy) -> Self {
        Self { store, checksum }
    }

    /// Execute the submit command
    pub async fn execute(&self, command: SubmitOrderCommand) -> Result<SubmitOutcome, AppError> {
        let number = OrderNumber::parse(&command.number)?;
        self.checksum.validate(&number)?;

        let mut tx = self.store.begin().await?;

        if let Some(existing) = tx.lock_order(&number).await? {
            return classify(&existing, &command.login);
        }

        let order = Order::purchase(number.clone(), command.login.as_str(), Utc::now());
        if tx.insert_order(&order).await? {
            tx.commit().await?;
            tracing::info!(order = %number, login = %command.login, "Order accepted");
            return Ok(SubmitOutcome::Accepted);
        }

        // Lost an insert race: the winner's row decides the outcome
        tx.rollback().await?;
        let winner = self.store.load_order(&number).await?.ok_or_else(|| {
            AppError::Internal(format!("order {} vanished after conflict", number))
        })?;
        classify(&winner, &command.login)
    }
}

fn classify(existing: &Order, login: &str) -> Result<SubmitOutcome, AppError> {
    if existing.owner != login {
        return Err(DomainError::OrderConflict {
            number: existing.number.to_string(),
        }
        .into());
    }
    if existing.is_withdrawal() {
        return Err(DomainError::OrderNumberTaken(existing.number.to_string()).into());
    }
    Ok(SubmitOutcome::AlreadyAccepted)
}
