use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::action::{Action, HttpGetAction};
use crate::config::Config;
use crate::domain::format_duration;
use crate::error::LoadgenError;
use crate::executor::{executor_for, ScenarioContext, ScenarioOutcome};
use crate::metrics::{run_periodic_reporter, MetricsCollector, Summary};

/// One execution of every configured scenario
pub struct TestRun {
    pub id: Uuid,
    config: Config,
    action: Arc<dyn Action>,
    metrics: MetricsCollector,
}

impl TestRun {
    /// Build a run whose iterations GET the configured target.
    pub fn new(config: Config) -> Result<Self, LoadgenError> {
        let action = Arc::new(HttpGetAction::new(&config.target)?);
        Self::with_action(config, action)
    }

    /// Build a run with a custom iteration body.
    pub fn with_action(config: Config, action: Arc<dyn Action>) -> Result<Self, LoadgenError> {
        config.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            action,
            metrics: MetricsCollector::new()?,
        })
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Run all scenarios concurrently and return the end-of-test summary.
    ///
    /// Cancelling `cancel` stops new iterations; in-flight ones get each
    /// scenario's graceful stop before being interrupted.
    pub async fn execute(&self, cancel: CancellationToken) -> Result<Summary> {
        info!(
            run_id = %self.id,
            target = %self.config.target.url,
            scenarios = self.config.scenarios.len(),
            max_run_time = %format_duration(self.config.max_run_time()),
            "starting test run"
        );

        let reporter_stop = CancellationToken::new();
        let reporter = tokio::spawn(run_periodic_reporter(
            self.metrics.clone(),
            self.config.output.report_interval_secs,
            reporter_stop.clone(),
        ));

        let run_cancel = cancel.child_token();
        let scenarios = self
            .config
            .scenarios
            .iter()
            .map(|(name, scenario)| {
                let ctx = ScenarioContext {
                    name: name.clone(),
                    config: scenario.clone(),
                    action: Arc::clone(&self.action),
                    metrics: self.metrics.clone(),
                    cancel: run_cancel.child_token(),
                };
                (name.clone(), tokio::spawn(run_scenario(ctx)))
            })
            .collect();

        let results = join_scenarios(scenarios, &run_cancel).await;
        reporter_stop.cancel();
        let _ = reporter.await;

        let outcomes = results.context("scenario failed")?;

        if outcomes.iter().any(|o| o.cancelled) {
            warn!(run_id = %self.id, "test run was interrupted before completion");
        }

        let summary = Summary::from_snapshot(self.id, &self.metrics.snapshot());
        if let Some(path) = &self.config.output.summary_export {
            summary
                .export(path)
                .await
                .with_context(|| format!("failed to write summary to {}", path.display()))?;
            info!(path = %path.display(), "summary exported");
        }
        Ok(summary)
    }
}

type ScenarioHandle = (String, JoinHandle<Result<ScenarioOutcome, LoadgenError>>);

/// Wait for every scenario. The first failure cancels the run and aborts the
/// scenarios still running.
async fn join_scenarios(
    handles: Vec<ScenarioHandle>,
    run_cancel: &CancellationToken,
) -> Result<Vec<ScenarioOutcome>, LoadgenError> {
    let aborts: Vec<_> = handles.iter().map(|(_, handle)| handle.abort_handle()).collect();
    let joined = handles.into_iter().map(|(name, handle)| async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(scenario = %name, error = %e, "scenario task failed");
                Err(LoadgenError::ScenarioPanicked(name))
            }
        }
    });

    let result = try_join_all(joined).await;
    if let Err(e) = &result {
        warn!(error = %e, "stopping remaining scenarios");
        run_cancel.cancel();
        for abort in &aborts {
            abort.abort();
        }
    }
    result
}

async fn run_scenario(ctx: ScenarioContext) -> Result<ScenarioOutcome, LoadgenError> {
    let start_time = ctx.config.start_time;
    if !start_time.is_zero() {
        info!(scenario = %ctx.name, start_time = %format_duration(start_time), "waiting for start time");
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Ok(ScenarioOutcome {
                    name: ctx.name,
                    cancelled: true,
                    ..Default::default()
                });
            }
            _ = sleep(start_time) => {}
        }
    }
    executor_for(ctx.config.executor).run(ctx).await
}
