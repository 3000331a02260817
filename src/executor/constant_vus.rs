use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tokio_util::task::TaskTracker;
use tracing::info;

use super::{Executor, IterationRunner, ScenarioContext, ScenarioOutcome, VirtualUser};
use crate::domain::format_duration;
use crate::error::LoadgenError;

/// A fixed number of VUs looping iterations back to back for `duration`.
pub struct ConstantVus;

#[async_trait]
impl Executor for ConstantVus {
    async fn run(&self, ctx: ScenarioContext) -> Result<ScenarioOutcome, LoadgenError> {
        let config = &ctx.config;
        let vus = config.initial_vus();
        let runner = Arc::new(IterationRunner::new(&ctx));
        let tracker = TaskTracker::new();

        ctx.metrics.register_scenario(&ctx.name);
        ctx.metrics.vus_allocated(&ctx.name, vus);

        info!(
            scenario = %ctx.name,
            executor = %config.executor,
            vus,
            duration = %format_duration(config.duration),
            "starting scenario"
        );

        let deadline = Instant::now() + config.duration;
        for id in 1..=vus {
            let runner = Arc::clone(&runner);
            let cancel = ctx.cancel.clone();
            tracker.spawn(async move {
                let mut vu = VirtualUser::new(id);
                while Instant::now() < deadline && !cancel.is_cancelled() {
                    if !runner.run(&mut vu).await {
                        break;
                    }
                }
            });
        }

        let cancelled = tokio::select! {
            _ = ctx.cancel.cancelled() => true,
            _ = sleep_until(deadline) => false,
        };
        if cancelled {
            info!(scenario = %ctx.name, "scenario cancelled, VUs finish their current iteration");
        }
        runner.drain(&tracker, config.graceful_stop).await;

        Ok(runner.outcome(0, vus, cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutorKind, ScenarioConfig};
    use crate::executor::testing::{context, SleepAction};
    use std::time::Duration;

    fn scenario(vus: u64, duration: Duration) -> ScenarioConfig {
        ScenarioConfig {
            executor: ExecutorKind::ConstantVus,
            rate: None,
            time_unit: Duration::from_secs(1),
            duration,
            pre_allocated_vus: None,
            max_vus: None,
            vus: Some(vus),
            start_time: Duration::ZERO,
            graceful_stop: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_vus_loop_until_duration() {
        let action = SleepAction::new(Duration::from_millis(100));
        let ctx = context(scenario(3, Duration::from_secs(1)), action.clone());
        let metrics = ctx.metrics.clone();

        let outcome = ConstantVus.run(ctx).await.unwrap();

        assert_eq!(outcome.completed, 30);
        assert_eq!(outcome.vus_max, 3);
        assert_eq!(metrics.snapshot().scenarios["test"].iterations, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_iteration_finishes_within_grace() {
        // 400ms iterations: the third starts at 800ms and ends after the deadline
        let action = SleepAction::new(Duration::from_millis(400));
        let ctx = context(scenario(1, Duration::from_secs(1)), action.clone());

        let outcome = ConstantVus.run(ctx).await.unwrap();

        assert_eq!(outcome.completed, 3);
        assert_eq!(outcome.interrupted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_past_grace_is_interrupted() {
        let action = SleepAction::new(Duration::from_secs(5));
        let mut config = scenario(2, Duration::from_secs(1));
        config.graceful_stop = Duration::from_millis(500);
        let ctx = context(config, action.clone());

        let outcome = ConstantVus.run(ctx).await.unwrap();

        assert_eq!(outcome.completed, 0);
        assert_eq!(outcome.interrupted, 2);
    }
}
