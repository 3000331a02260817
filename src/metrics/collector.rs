//! Metrics collector - thread-safe counters with HdrHistogram latency tracking

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::LoadgenError;

/// Counters for a single scenario
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScenarioCounters {
    pub iterations: u64,
    pub failed_iterations: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub vus_max: u64,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    iterations: u64,
    dropped_iterations: u64,
    interrupted_iterations: u64,
    http_reqs: u64,
    http_req_failed: u64,
    data_received: u64,
    vus: u64,
    vus_max: u64,
    status_codes: BTreeMap<u16, u64>,
    scenarios: BTreeMap<String, ScenarioCounters>,
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl LatencyStats {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }
        let ms = |micros: u64| micros as f64 / 1_000.0;
        Self {
            count: hist.len(),
            min: ms(hist.min()),
            avg: hist.mean() / 1_000.0,
            med: ms(hist.value_at_quantile(0.50)),
            p90: ms(hist.value_at_quantile(0.90)),
            p95: ms(hist.value_at_quantile(0.95)),
            p99: ms(hist.value_at_quantile(0.99)),
            max: ms(hist.max()),
        }
    }
}

/// Point-in-time copy of every metric
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub iterations: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub http_reqs: u64,
    pub http_req_failed: u64,
    pub data_received: u64,
    pub vus: u64,
    pub vus_max: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub scenarios: BTreeMap<String, ScenarioCounters>,
    pub http_req_duration: LatencyStats,
    pub iteration_duration: LatencyStats,
}

impl MetricsSnapshot {
    /// Per-second rate of `count` over the elapsed time
    pub fn rate(&self, count: u64) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            count as f64 / secs
        }
    }
}

#[derive(Clone)]
pub struct MetricsCollector {
    counters: Arc<Mutex<Counters>>,
    http_latencies: Arc<RwLock<Histogram<u64>>>,
    iteration_latencies: Arc<RwLock<Histogram<u64>>>,
    started_at: DateTime<Utc>,
    start_time: Instant,
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX).max(1)
}

impl MetricsCollector {
    pub fn new() -> Result<Self, LoadgenError> {
        // 3 significant digits, auto-resizing
        let http_hist = Histogram::new(3).map_err(|e| LoadgenError::Metrics(e.to_string()))?;
        let iteration_hist = Histogram::new(3).map_err(|e| LoadgenError::Metrics(e.to_string()))?;

        Ok(Self {
            counters: Arc::new(Mutex::new(Counters::default())),
            http_latencies: Arc::new(RwLock::new(http_hist)),
            iteration_latencies: Arc::new(RwLock::new(iteration_hist)),
            started_at: Utc::now(),
            start_time: Instant::now(),
        })
    }

    pub fn register_scenario(&self, scenario: &str) {
        self.counters
            .lock()
            .scenarios
            .entry(scenario.to_string())
            .or_default();
    }

    pub fn http_request(&self, status: Option<u16>, failed: bool, bytes: u64, duration: Duration) {
        {
            let mut c = self.counters.lock();
            c.http_reqs += 1;
            if failed {
                c.http_req_failed += 1;
            }
            c.data_received += bytes;
            if let Some(status) = status {
                *c.status_codes.entry(status).or_default() += 1;
            }
        }
        let _ = self.http_latencies.write().record(micros(duration));
    }

    pub fn iteration_completed(&self, scenario: &str, failed: bool, duration: Duration) {
        {
            let mut c = self.counters.lock();
            c.iterations += 1;
            let s = c.scenarios.entry(scenario.to_string()).or_default();
            s.iterations += 1;
            if failed {
                s.failed_iterations += 1;
            }
        }
        let _ = self.iteration_latencies.write().record(micros(duration));
    }

    pub fn iteration_dropped(&self, scenario: &str) {
        let mut c = self.counters.lock();
        c.dropped_iterations += 1;
        c.scenarios.entry(scenario.to_string()).or_default().dropped_iterations += 1;
    }

    pub fn iterations_interrupted(&self, scenario: &str, count: u64) {
        if count == 0 {
            return;
        }
        let mut c = self.counters.lock();
        c.interrupted_iterations += count;
        c.scenarios.entry(scenario.to_string()).or_default().interrupted_iterations += count;
    }

    /// A VU started running an iteration
    pub fn vu_busy(&self) {
        self.counters.lock().vus += 1;
    }

    pub fn vu_idle(&self) {
        let mut c = self.counters.lock();
        c.vus = c.vus.saturating_sub(1);
    }

    pub fn vus_allocated(&self, scenario: &str, count: u64) {
        let mut c = self.counters.lock();
        c.vus_max += count;
        c.scenarios.entry(scenario.to_string()).or_default().vus_max += count;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.counters.lock().clone();
        MetricsSnapshot {
            started_at: self.started_at,
            elapsed: self.elapsed(),
            iterations: c.iterations,
            dropped_iterations: c.dropped_iterations,
            interrupted_iterations: c.interrupted_iterations,
            http_reqs: c.http_reqs,
            http_req_failed: c.http_req_failed,
            data_received: c.data_received,
            vus: c.vus,
            vus_max: c.vus_max,
            status_codes: c.status_codes,
            scenarios: c.scenarios,
            http_req_duration: LatencyStats::from_histogram(&self.http_latencies.read()),
            iteration_duration: LatencyStats::from_histogram(&self.iteration_latencies.read()),
        }
    }
}
