//! Scheduled Jobs
//!
//! Background reconciliation of purchase orders against the settlement
//! service, run on a fixed interval independent of HTTP traffic.

mod reconciler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::accrual::AccrualSource;
use crate::store::Store;

pub use reconciler::{CycleReport, OrderOutcome, ReconcileError, Reconciler};

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between reconciliation cycles (default: 2 seconds)
    pub reconcile_interval: Duration,
    /// Deadline for one cycle (default: 30 seconds)
    pub cycle_timeout: Duration,
    /// Concurrent settlement queries per cycle (default: 4)
    pub worker_pool_size: usize,
    /// Maximum orders per cycle (default: 1000)
    pub batch_limit: i64,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(2),
            cycle_timeout: Duration::from_secs(30),
            worker_pool_size: 4,
            batch_limit: 1000,
        }
    }
}

/// Clears the in-flight flag when a cycle ends, however it ends
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Job Scheduler - runs reconciliation cycles in the background
pub struct JobScheduler<S: Store, A: AccrualSource> {
    reconciler: Arc<Reconciler<S, A>>,
    config: JobSchedulerConfig,
    in_flight: Arc<AtomicBool>,
}

impl<S: Store, A: AccrualSource> JobScheduler<S, A> {
    /// Create a new job scheduler
    pub fn new(store: Arc<S>, source: Arc<A>) -> Self {
        Self::with_config(store, source, JobSchedulerConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(store: Arc<S>, source: Arc<A>, config: JobSchedulerConfig) -> Self {
        let reconciler = Reconciler::new(
            store,
            source,
            config.worker_pool_size,
            config.batch_limit,
        );
        Self {
            reconciler: Arc::new(reconciler),
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reconciler(&self) -> Arc<Reconciler<S, A>> {
        self.reconciler.clone()
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            interval_ms = self.config.reconcile_interval.as_millis() as u64,
            workers = self.config.worker_pool_size,
            "Job scheduler started"
        );

        let mut ticker = interval(self.config.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.spawn_cycle();
        }
    }

    /// Start a detached cycle unless the previous one is still running
    fn spawn_cycle(&self) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("Previous reconciliation cycle still running, skipping tick");
            return;
        }

        let guard = InFlight(self.in_flight.clone());
        let reconciler = self.reconciler.clone();
        let deadline = self.config.cycle_timeout;

        tokio::spawn(async move {
            let _guard = guard;
            match tokio::time::timeout(deadline, reconciler.run_cycle()).await {
                Ok(Ok(_report)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Reconciliation cycle failed"),
                Err(_) => tracing::warn!(
                    timeout_ms = deadline.as_millis() as u64,
                    "Reconciliation cycle timed out"
                ),
            }
        });
    }
}

// =========================================================================
// Tests
// =========================================================================
