use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

use super::types::{deserialize_duration, serialize_duration};
use crate::error::LoadgenError;

/// Scheduling mode of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExecutorKind {
    /// Start `rate` iterations per `timeUnit`, regardless of response time
    ConstantArrivalRate,
    /// Keep `vus` virtual users looping iterations back to back
    ConstantVus,
}

fn default_time_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// One entry of the scenario map.
///
/// Keys follow the camelCase names used by declarative load-test scripts.
/// Other spellings are mapped onto them by [`canonical_key`] before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_executor_fields"))]
pub struct ScenarioConfig {
    pub executor: ExecutorKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "rate must be at least 1"))]
    pub rate: Option<u64>,

    #[serde(
        rename = "timeUnit",
        default = "default_time_unit",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub time_unit: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,

    #[serde(
        rename = "preAllocatedVUs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(range(min = 1, message = "preAllocatedVUs must be at least 1"))]
    pub pre_allocated_vus: Option<u64>,

    #[serde(
        rename = "maxVUs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_vus: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "vus must be at least 1"))]
    pub vus: Option<u64>,

    #[serde(
        rename = "startTime",
        default,
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub start_time: Duration,

    #[serde(
        rename = "gracefulStop",
        default = "default_graceful_stop",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub graceful_stop: Duration,
}

const CAMEL_CASE_KEYS: &[&str] = &[
    "timeUnit",
    "preAllocatedVUs",
    "maxVUs",
    "startTime",
    "gracefulStop",
];

/// Map any spelling of a scenario key (`maxvus`, `max_vus`, `MAXVUS`) onto the
/// camelCase name the schema uses. Unknown keys pass through unchanged.
pub fn canonical_key(key: &str) -> String {
    let folded: String = key
        .chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    CAMEL_CASE_KEYS
        .iter()
        .chain(["executor", "rate", "duration", "vus"].iter())
        .find(|name| name.to_ascii_lowercase() == folded)
        .map(|name| name.to_string())
        .unwrap_or_else(|| key.to_string())
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_executor_fields(scenario: &ScenarioConfig) -> Result<(), ValidationError> {
    if scenario.duration.is_zero() {
        return Err(rule("duration", "duration must be greater than zero"));
    }
    match scenario.executor {
        ExecutorKind::ConstantArrivalRate => {
            if scenario.rate.is_none() {
                return Err(rule("rate", "rate is required for constant-arrival-rate"));
            }
            if scenario.time_unit.is_zero() {
                return Err(rule("timeUnit", "timeUnit must be greater than zero"));
            }
            let pre = scenario.pre_allocated_vus.ok_or_else(|| {
                rule("preAllocatedVUs", "preAllocatedVUs is required for constant-arrival-rate")
            })?;
            if scenario.max_vus.is_some_and(|max| max < pre) {
                return Err(rule("maxVUs", "maxVUs must be >= preAllocatedVUs"));
            }
            if scenario.vus.is_some() {
                return Err(rule("executor", "vus only applies to constant-vus"));
            }
        }
        ExecutorKind::ConstantVus => {
            let arrival_rate_fields = scenario.rate.is_some()
                || scenario.pre_allocated_vus.is_some()
                || scenario.max_vus.is_some();
            if arrival_rate_fields {
                return Err(rule(
                    "executor",
                    "rate, preAllocatedVUs and maxVUs only apply to constant-arrival-rate",
                ));
            }
        }
    }
    Ok(())
}

impl ScenarioConfig {
    /// Check the scenario, reporting failures under its map key.
    pub fn check(&self, name: &str) -> Result<(), LoadgenError> {
        self.validate().map_err(|errors| LoadgenError::Validation {
            scenario: name.to_string(),
            message: errors.to_string(),
        })
    }

    /// Size of the VU pool at start.
    pub fn initial_vus(&self) -> u64 {
        match self.executor {
            ExecutorKind::ConstantArrivalRate => self.pre_allocated_vus.unwrap_or(1),
            ExecutorKind::ConstantVus => self.vus.unwrap_or(1),
        }
    }

    /// Upper bound of the VU pool; `maxVUs` falls back to `preAllocatedVUs`.
    pub fn max_vus(&self) -> u64 {
        match self.executor {
            ExecutorKind::ConstantArrivalRate => self.max_vus.unwrap_or_else(|| self.initial_vus()),
            ExecutorKind::ConstantVus => self.initial_vus(),
        }
    }

    /// Number of iterations an arrival-rate scenario schedules over its duration,
    /// i.e. the starts whose offset falls strictly inside `[0, duration)`.
    pub fn planned_iterations(&self) -> Option<u64> {
        if self.executor != ExecutorKind::ConstantArrivalRate || self.time_unit.is_zero() {
            return None;
        }
        let rate = self.rate? as u128;
        let unit = self.time_unit.as_nanos();
        let planned = (self.duration.as_nanos() * rate).div_ceil(unit);
        Some(u64::try_from(planned).unwrap_or(u64::MAX))
    }
}
