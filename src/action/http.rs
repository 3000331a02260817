use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Url;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

use super::Action;
use crate::config::TargetConfig;
use crate::error::{IterationError, LoadgenError};
use crate::executor::VirtualUser;
use crate::metrics::MetricsCollector;

/// Result of a single reachability check
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub status: u16,
    pub expected: bool,
    pub latency_ms: f64,
    pub bytes: u64,
}

/// Default iteration body: one GET against the configured URL.
#[derive(Clone)]
pub struct HttpGetAction {
    client: reqwest::Client,
    url: Url,
    target: TargetConfig,
}

impl HttpGetAction {
    pub fn new(target: &TargetConfig) -> Result<Self, LoadgenError> {
        let url = target.parsed_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&target.user_agent)
                .map_err(|e| LoadgenError::InvalidTarget(format!("user agent: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .timeout(target.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url,
            target: target.clone(),
        })
    }

    /// Send one request and drain the body. Returns status, body size and latency.
    async fn send(&self) -> (Result<(u16, u64), IterationError>, Duration) {
        let start = Instant::now();
        let result = async {
            let resp = self.client.get(self.url.clone()).send().await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            Ok::<_, IterationError>((status, body.len() as u64))
        }
        .await;
        (result, start.elapsed())
    }

    /// Single GET used to check the endpoint is reachable before a run.
    pub async fn probe(&self) -> Result<ProbeReport, IterationError> {
        let (result, elapsed) = self.send().await;
        let (status, bytes) = result?;
        Ok(ProbeReport {
            url: self.url.to_string(),
            status,
            expected: self.target.is_expected_status(status),
            latency_ms: elapsed.as_secs_f64() * 1_000.0,
            bytes,
        })
    }
}

#[async_trait]
impl Action for HttpGetAction {
    async fn iterate(&self, vu: &VirtualUser, metrics: &MetricsCollector) -> Result<(), IterationError> {
        let (result, elapsed) = self.send().await;
        match result {
            Ok((status, bytes)) => {
                let expected = self.target.is_expected_status(status);
                metrics.http_request(Some(status), !expected, bytes, elapsed);
                if expected {
                    Ok(())
                } else {
                    debug!(vu = vu.id(), status, "unexpected status");
                    Err(IterationError::UnexpectedStatus(status))
                }
            }
            Err(err) => {
                metrics.http_request(None, true, 0, elapsed);
                debug!(vu = vu.id(), error = %err, "request failed");
                Err(err)
            }
        }
    }
}
