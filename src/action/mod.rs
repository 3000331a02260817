use async_trait::async_trait;

use crate::error::IterationError;
use crate::executor::VirtualUser;
use crate::metrics::MetricsCollector;

pub mod http;

pub use http::{HttpGetAction, ProbeReport};

/// Body of one iteration, invoked by a VU each time the executor schedules it.
#[async_trait]
pub trait Action: Send + Sync {
    async fn iterate(&self, vu: &VirtualUser, metrics: &MetricsCollector) -> Result<(), IterationError>;
}
