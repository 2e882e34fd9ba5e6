//! Order reconciliation
//!
//! One cycle = snapshot the unsettled purchase orders, ask the settlement
//! service about each through a bounded worker pool, and apply every answer
//! in its own transaction. Workers return their outcome by value; the
//! coordinating task folds them into a [`CycleReport`].

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::accrual::{AccrualError, AccrualResult, AccrualSource};
use crate::domain::{OrderNumber, OrderState};
use crate::ledger::{self, LedgerError};
use crate::store::{Store, StoreTx};

/// Reconciliation errors for a single order
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Settlement query failed: {0}")]
    Accrual(#[from] AccrualError),

    #[error("Ledger update failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl ReconcileError {
    /// The order is left as is and retried next cycle
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Accrual(e) => e.is_transient(),
            ReconcileError::Ledger(e) => e.is_transient(),
        }
    }
}

impl From<crate::store::StoreError> for ReconcileError {
    fn from(e: crate::store::StoreError) -> Self {
        ReconcileError::Ledger(LedgerError::Store(e))
    }
}

/// What reconciling one order did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOutcome {
    /// Moved to a terminal state; `accrual` was credited to the owner
    Settled { state: OrderState, accrual: i64 },
    /// Not resolved yet; the order is (now) `PROCESSING`
    Pending,
    /// Someone else settled it first
    AlreadySettled,
    /// The order row no longer exists
    Vanished,
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub orders_scanned: usize,
    pub settled: usize,
    /// Minor units credited during the cycle
    pub credited: i64,
    pub pending: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub completed_at: DateTime<Utc>,
}

impl CycleReport {
    fn new(orders_scanned: usize) -> Self {
        Self {
            orders_scanned,
            settled: 0,
            credited: 0,
            pending: 0,
            unchanged: 0,
            failed: 0,
            completed_at: Utc::now(),
        }
    }

    fn record(
        mut self,
        number: &OrderNumber,
        result: Result<OrderOutcome, ReconcileError>,
    ) -> Self {
        match result {
            Ok(OrderOutcome::Settled { state, accrual }) => {
                tracing::info!(order = %number, state = %state, accrual = accrual, "Order settled");
                self.settled += 1;
                if state == OrderState::Processed {
                    self.credited += accrual;
                }
            }
            Ok(OrderOutcome::Pending) => self.pending += 1,
            Ok(OrderOutcome::AlreadySettled | OrderOutcome::Vanished) => self.unchanged += 1,
            Err(e) if e.is_transient() => {
                tracing::warn!(order = %number, error = %e, "Reconciliation deferred");
                self.failed += 1;
            }
            Err(e) => {
                tracing::error!(order = %number, error = %e, "Reconciliation failed");
                self.failed += 1;
            }
        }
        self
    }
}

/// Settles purchase orders against a settlement source
pub struct Reconciler<S: Store, A: AccrualSource> {
    store: Arc<S>,
    source: Arc<A>,
    worker_pool_size: usize,
    batch_limit: i64,
}

impl<S: Store, A: AccrualSource> Reconciler<S, A> {
    pub fn new(store: Arc<S>, source: Arc<A>, worker_pool_size: usize, batch_limit: i64) -> Self {
        Self {
            store,
            source,
            worker_pool_size: worker_pool_size.max(1),
            batch_limit,
        }
    }

    /// Run one reconciliation pass over the current unsettled orders
    pub async fn run_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let numbers = self.store.load_unsettled_orders(self.batch_limit).await?;
        let scanned = numbers.len();
        if scanned == 0 {
            return Ok(CycleReport::new(0));
        }

        tracing::debug!(orders = scanned, "Reconciliation cycle started");

        let mut report = stream::iter(numbers)
            .map(|number| async move {
                let result = self.reconcile_order(&number).await;
                (number, result)
            })
            .buffer_unordered(self.worker_pool_size)
            .fold(CycleReport::new(scanned), |report, (number, result)| async move {
                report.record(&number, result)
            })
            .await;

        report.completed_at = Utc::now();
        tracing::info!(
            scanned = report.orders_scanned,
            settled = report.settled,
            credited = report.credited,
            pending = report.pending,
            failed = report.failed,
            "Reconciliation cycle completed"
        );
        Ok(report)
    }

    /// Query and apply the settlement status of one order
    pub async fn reconcile_order(
        &self,
        number: &OrderNumber,
    ) -> Result<OrderOutcome, ReconcileError> {
        match self.source.fetch_status(number).await? {
            AccrualResult::Unregistered | AccrualResult::Pending(_) => {
                self.mark_processing(number).await
            }
            AccrualResult::Resolved { state, accrual } => self.settle(number, state, accrual).await,
        }
    }

    async fn mark_processing(&self, number: &OrderNumber) -> Result<OrderOutcome, ReconcileError> {
        let mut tx = self.store.begin().await?;
        let Some(order) = tx.lock_order(number).await? else {
            return Ok(OrderOutcome::Vanished);
        };

        match order.state {
            OrderState::New => {
                tx.update_order_state(number, OrderState::Processing, 0).await?;
                tx.commit().await?;
                tracing::debug!(order = %number, "Order moved to PROCESSING");
                Ok(OrderOutcome::Pending)
            }
            OrderState::Processing => Ok(OrderOutcome::Pending),
            OrderState::Processed | OrderState::Invalid => Ok(OrderOutcome::AlreadySettled),
        }
    }

    /// Set the terminal state and credit the owner in one transaction
    async fn settle(
        &self,
        number: &OrderNumber,
        state: OrderState,
        accrual: i64,
    ) -> Result<OrderOutcome, ReconcileError> {
        let mut tx = self.store.begin().await?;
        let Some(order) = tx.lock_order(number).await? else {
            return Ok(OrderOutcome::Vanished);
        };
        if order.state.is_terminal() {
            return Ok(OrderOutcome::AlreadySettled);
        }
        order
            .state
            .transition_to(state)
            .map_err(LedgerError::from)?;

        let accrual = if state == OrderState::Processed { accrual } else { 0 };
        if tx.update_order_state(number, state, accrual).await?.is_none() {
            return Ok(OrderOutcome::AlreadySettled);
        }
        if accrual > 0 {
            ledger::credit_in(&mut tx, &order.owner, accrual).await?;
        }

        tx.commit().await?;
        Ok(OrderOutcome::Settled { state, accrual })
    }
}
