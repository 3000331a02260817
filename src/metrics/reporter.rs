//! Periodic progress reporting

use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::collector::MetricsCollector;

/// Log a progress line every `interval_secs` until cancelled.
pub async fn run_periodic_reporter(
    collector: MetricsCollector,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    if interval_secs == 0 {
        return;
    }
    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => log_progress(&collector),
        }
    }
}

pub fn log_progress(collector: &MetricsCollector) {
    let snap = collector.snapshot();
    info!(
        elapsed_secs = snap.elapsed.as_secs(),
        iterations = snap.iterations,
        rps = %format!("{:.1}", snap.rate(snap.http_reqs)),
        vus = snap.vus,
        vus_max = snap.vus_max,
        dropped = snap.dropped_iterations,
        failed = snap.http_req_failed,
        p95_ms = %format!("{:.2}", snap.http_req_duration.p95),
        "progress"
    );
}
