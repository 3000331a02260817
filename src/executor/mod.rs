use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::action::Action;
use crate::domain::{ExecutorKind, ScenarioConfig};
use crate::error::{IterationError, LoadgenError};
use crate::metrics::MetricsCollector;

pub mod arrival_rate;
pub mod constant_vus;
pub mod pool;

pub use arrival_rate::ConstantArrivalRate;
pub use constant_vus::ConstantVus;
pub use pool::{Acquired, VirtualUser, VuPool};

/// Everything a scenario needs to run
#[derive(Clone)]
pub struct ScenarioContext {
    pub name: String,
    pub config: ScenarioConfig,
    pub action: Arc<dyn Action>,
    pub metrics: MetricsCollector,
    /// Stops scheduling new iterations; in-flight ones still get the grace period
    pub cancel: CancellationToken,
}

/// What a scenario did
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub interrupted: u64,
    pub vus_max: u64,
    pub cancelled: bool,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, ctx: ScenarioContext) -> Result<ScenarioOutcome, LoadgenError>;
}

pub fn executor_for(kind: ExecutorKind) -> Box<dyn Executor> {
    match kind {
        ExecutorKind::ConstantArrivalRate => Box::new(ConstantArrivalRate),
        ExecutorKind::ConstantVus => Box::new(ConstantVus),
    }
}

/// State shared by the iteration tasks of one scenario
pub(crate) struct IterationRunner {
    name: String,
    action: Arc<dyn Action>,
    metrics: MetricsCollector,
    hard_stop: CancellationToken,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    interrupted: AtomicU64,
}

impl IterationRunner {
    pub(crate) fn new(ctx: &ScenarioContext) -> Self {
        Self {
            name: ctx.name.clone(),
            action: Arc::clone(&ctx.action),
            metrics: ctx.metrics.clone(),
            hard_stop: CancellationToken::new(),
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
        }
    }

    /// Run one iteration on `vu`. Returns false if it was interrupted.
    ///
    /// A panicking action counts as a failed iteration; the VU stays usable.
    pub(crate) async fn run(&self, vu: &mut VirtualUser) -> bool {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.metrics.vu_busy();
        let start = Instant::now();
        let vu_id = vu.id();

        let iteration = AssertUnwindSafe(self.action.iterate(vu, &self.metrics)).catch_unwind();
        let result = tokio::select! {
            result = iteration => Some(result.unwrap_or_else(|panic| {
                let error = IterationError::Panicked(panic_message(panic.as_ref()));
                warn!(scenario = %self.name, vu = vu_id, error = %error, "iteration panicked");
                Err(error)
            })),
            _ = self.hard_stop.cancelled() => None,
        };
        self.metrics.vu_idle();

        match result {
            Some(result) => {
                vu.record_iteration();
                self.completed.fetch_add(1, Ordering::Relaxed);
                if result.is_err() {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics
                    .iteration_completed(&self.name, result.is_err(), start.elapsed());
                true
            }
            None => {
                self.interrupted.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Wait for in-flight iterations, interrupting whatever outlives `grace`.
    pub(crate) async fn drain(&self, tracker: &TaskTracker, grace: Duration) {
        tracker.close();
        if timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                scenario = %self.name,
                in_flight = tracker.len(),
                grace_secs = grace.as_secs_f64(),
                "graceful stop elapsed, interrupting iterations"
            );
            self.hard_stop.cancel();
            tracker.wait().await;
        }
        self.metrics
            .iterations_interrupted(&self.name, self.interrupted.load(Ordering::Relaxed));
    }

    pub(crate) fn outcome(&self, dropped: u64, vus_max: u64, cancelled: bool) -> ScenarioOutcome {
        let outcome = ScenarioOutcome {
            name: self.name.clone(),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped,
            interrupted: self.interrupted.load(Ordering::Relaxed),
            vus_max,
            cancelled,
        };
        info!(
            scenario = %outcome.name,
            completed = outcome.completed,
            failed = outcome.failed,
            dropped = outcome.dropped,
            interrupted = outcome.interrupted,
            vus_max = outcome.vus_max,
            cancelled = outcome.cancelled,
            "scenario finished"
        );
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
