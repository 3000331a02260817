use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use uuid::Uuid;

use super::collector::{LatencyStats, MetricsSnapshot, ScenarioCounters};
use crate::error::LoadgenError;

#[derive(Debug, Clone, Serialize)]
pub struct CountRate {
    pub count: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRatio {
    pub fails: u64,
    pub total: u64,
    pub ratio: f64,
}

/// End-of-test summary
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub iterations: CountRate,
    pub dropped_iterations: CountRate,
    pub interrupted_iterations: u64,
    pub http_reqs: CountRate,
    pub http_req_failed: FailureRatio,
    pub http_req_duration: LatencyStats,
    pub iteration_duration: LatencyStats,
    pub data_received: CountRate,
    pub vus_max: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub scenarios: BTreeMap<String, ScenarioCounters>,
}

impl Summary {
    pub fn from_snapshot(run_id: Uuid, snap: &MetricsSnapshot) -> Self {
        let count_rate = |count: u64| CountRate { count, rate: snap.rate(count) };
        let ratio = if snap.http_reqs == 0 {
            0.0
        } else {
            snap.http_req_failed as f64 / snap.http_reqs as f64
        };

        Self {
            run_id,
            started_at: snap.started_at,
            elapsed_secs: snap.elapsed.as_secs_f64(),
            iterations: count_rate(snap.iterations),
            dropped_iterations: count_rate(snap.dropped_iterations),
            interrupted_iterations: snap.interrupted_iterations,
            http_reqs: count_rate(snap.http_reqs),
            http_req_failed: FailureRatio {
                fails: snap.http_req_failed,
                total: snap.http_reqs,
                ratio,
            },
            http_req_duration: snap.http_req_duration.clone(),
            iteration_duration: snap.iteration_duration.clone(),
            data_received: count_rate(snap.data_received),
            vus_max: snap.vus_max,
            status_codes: snap.status_codes.clone(),
            scenarios: snap.scenarios.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, LoadgenError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub async fn export(&self, path: &Path) -> Result<(), LoadgenError> {
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }

    /// Human-readable end-of-test report
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n  run {}  ({:.1}s)\n", self.run_id, self.elapsed_secs);

        for (name, s) in &self.scenarios {
            let _ = writeln!(
                out,
                "  scenario {name}: {} iterations ({} failed, {} dropped, {} interrupted), {} VUs",
                s.iterations, s.failed_iterations, s.dropped_iterations, s.interrupted_iterations, s.vus_max
            );
        }
        out.push('\n');

        row(
            &mut out,
            "data_received",
            format!("{:<10} {}/s", format_bytes(self.data_received.count as f64), format_bytes(self.data_received.rate)),
        );
        row(
            &mut out,
            "dropped_iterations",
            format!("{:<10} {:.2}/s", self.dropped_iterations.count, self.dropped_iterations.rate),
        );
        row(&mut out, "http_req_duration", latency(&self.http_req_duration));
        row(
            &mut out,
            "http_req_failed",
            format!(
                "{:.2}%   {} out of {}",
                self.http_req_failed.ratio * 100.0,
                self.http_req_failed.fails,
                self.http_req_failed.total
            ),
        );
        row(
            &mut out,
            "http_reqs",
            format!("{:<10} {:.2}/s", self.http_reqs.count, self.http_reqs.rate),
        );
        row(&mut out, "iteration_duration", latency(&self.iteration_duration));
        row(
            &mut out,
            "iterations",
            format!("{:<10} {:.2}/s", self.iterations.count, self.iterations.rate),
        );
        if self.interrupted_iterations > 0 {
            row(&mut out, "interrupted_iterations", self.interrupted_iterations.to_string());
        }
        row(&mut out, "vus_max", self.vus_max.to_string());

        if !self.status_codes.is_empty() {
            let codes = self
                .status_codes
                .iter()
                .map(|(code, n)| format!("{code}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            row(&mut out, "status_codes", codes);
        }
        out
    }
}

fn row(out: &mut String, name: &str, value: String) {
    let _ = writeln!(out, "     {name:.<32}: {value}");
}

fn latency(stats: &LatencyStats) -> String {
    format!(
        "avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
        stats.avg, stats.min, stats.med, stats.max, stats.p90, stats.p95
    )
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use std::time::Duration;

    fn sample() -> Summary {
        let metrics = MetricsCollector::new().unwrap();
        metrics.vus_allocated("constant_request_rate", 50);
        for _ in 0..9 {
            metrics.http_request(Some(200), false, 2_000, Duration::from_millis(4));
            metrics.iteration_completed("constant_request_rate", false, Duration::from_millis(5));
        }
        metrics.http_request(Some(500), true, 100, Duration::from_millis(8));
        metrics.iteration_completed("constant_request_rate", true, Duration::from_millis(9));
        metrics.iteration_dropped("constant_request_rate");
        Summary::from_snapshot(Uuid::nil(), &metrics.snapshot())
    }

    #[test]
    fn test_failure_ratio() {
        let summary = sample();
        assert_eq!(summary.http_req_failed.fails, 1);
        assert_eq!(summary.http_req_failed.total, 10);
        assert!((summary.http_req_failed.ratio - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_render_text_lists_metrics() {
        let text = sample().render_text();
        assert!(text.contains("http_reqs"));
        assert!(text.contains("10.00%   1 out of 10"));
        assert!(text.contains("scenario constant_request_rate: 10 iterations (1 failed, 1 dropped, 0 interrupted), 50 VUs"));
        assert!(text.contains("200=9 500=1"));
    }

    #[test]
    fn test_json_shape() {
        let value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(value["iterations"]["count"], 10);
        assert_eq!(value["dropped_iterations"]["count"], 1);
        assert_eq!(value["status_codes"]["500"], 1);
        assert_eq!(value["vus_max"], 50);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512 B");
        assert_eq!(format_bytes(20_100.0), "20.1 kB");
        assert_eq!(format_bytes(3_400_000.0), "3.4 MB");
    }
}
