use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::{Acquired, Executor, IterationRunner, ScenarioContext, ScenarioOutcome, VuPool};
use crate::domain::format_duration;
use crate::error::LoadgenError;

/// Starts `rate` iterations per `timeUnit` independent of response time,
/// growing the VU pool from `preAllocatedVUs` up to `maxVUs` as needed.
pub struct ConstantArrivalRate;

/// Offset of iteration `index` from scenario start.
///
/// Integer nanosecond arithmetic so the schedule never drifts.
pub fn iteration_offset(index: u64, rate: u64, time_unit: Duration) -> Duration {
    let nanos = index as u128 * time_unit.as_nanos() / rate.max(1) as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[async_trait]
impl Executor for ConstantArrivalRate {
    async fn run(&self, ctx: ScenarioContext) -> Result<ScenarioOutcome, LoadgenError> {
        let config = &ctx.config;
        let rate = config.rate.ok_or_else(|| LoadgenError::Validation {
            scenario: ctx.name.clone(),
            message: "rate is required for constant-arrival-rate".to_string(),
        })?;
        let planned = config.planned_iterations().unwrap_or(0);
        let pool = Arc::new(VuPool::new(config.initial_vus(), config.max_vus()));
        let runner = Arc::new(IterationRunner::new(&ctx));
        let tracker = TaskTracker::new();

        ctx.metrics.register_scenario(&ctx.name);
        ctx.metrics.vus_allocated(&ctx.name, pool.allocated());

        info!(
            scenario = %ctx.name,
            executor = %config.executor,
            rate,
            time_unit = %format_duration(config.time_unit),
            duration = %format_duration(config.duration),
            pre_allocated_vus = pool.allocated(),
            max_vus = pool.max(),
            planned,
            "starting scenario"
        );

        let start = Instant::now();
        let mut dropped = 0u64;
        let mut cancelled = false;
        let mut warned_growth = false;

        for index in 0..planned {
            let at = start + iteration_offset(index, rate, config.time_unit);
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = sleep_until(at) => {}
            }

            let mut vu = match pool.acquire() {
                Acquired::Idle(vu) => vu,
                Acquired::Allocated(vu) => {
                    ctx.metrics.vus_allocated(&ctx.name, 1);
                    if !warned_growth {
                        warn!(
                            scenario = %ctx.name,
                            allocated = pool.allocated(),
                            "insufficient pre-allocated VUs, allocating more"
                        );
                        warned_growth = true;
                    }
                    vu
                }
                Acquired::Exhausted => {
                    if dropped == 0 {
                        warn!(
                            scenario = %ctx.name,
                            max_vus = pool.max(),
                            "insufficient VUs, reached maxVUs and dropping iterations"
                        );
                    }
                    dropped += 1;
                    ctx.metrics.iteration_dropped(&ctx.name);
                    continue;
                }
            };

            let runner = Arc::clone(&runner);
            let pool = Arc::clone(&pool);
            tracker.spawn(async move {
                runner.run(&mut vu).await;
                pool.release(vu);
            });
        }

        if cancelled {
            info!(scenario = %ctx.name, "scenario cancelled, no further iterations scheduled");
        }
        debug!(scenario = %ctx.name, in_flight = tracker.len(), "schedule complete, draining");
        runner.drain(&tracker, config.graceful_stop).await;

        Ok(runner.outcome(dropped, pool.allocated(), cancelled))
    }
}
