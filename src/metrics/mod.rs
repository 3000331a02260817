pub mod collector;
pub mod reporter;
pub mod summary;

pub use collector::{LatencyStats, MetricsCollector, MetricsSnapshot, ScenarioCounters};
pub use reporter::run_periodic_reporter;
pub use summary::Summary;
