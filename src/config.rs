use anyhow::{Context, Result};
use figment::providers::{Env, Format, Json, Serialized, Toml};
use figment::value::{Dict, Value};
use figment::Figment;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::domain::types::{deserialize_duration, serialize_duration};
use crate::domain::scenario::canonical_key;
use crate::domain::ScenarioConfig;
use crate::error::LoadgenError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const EMBEDDED_DEFAULT: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "LOADGEN__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    pub scenarios: BTreeMap<String, ScenarioConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TargetConfig {
    pub url: String,
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Lowest status code counted as success
    #[serde(default = "default_status_min")]
    #[validate(range(min = 100, max = 599))]
    pub expected_status_min: u16,
    /// Highest status code counted as success
    #[serde(default = "default_status_max")]
    #[validate(range(min = 100, max = 599))]
    pub expected_status_max: u16,
}

fn default_timeout() -> Duration { Duration::from_secs(60) }
fn default_user_agent() -> String { format!("arrival-loadgen/{}", env!("CARGO_PKG_VERSION")) }
fn default_status_min() -> u16 { 200 }
fn default_status_max() -> u16 { 399 }

impl TargetConfig {
    pub fn parsed_url(&self) -> Result<Url, LoadgenError> {
        let url = Url::parse(&self.url)
            .map_err(|e| LoadgenError::InvalidTarget(format!("{}: {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(LoadgenError::InvalidTarget(format!(
                "{}: unsupported scheme '{other}'",
                self.url
            ))),
        }
    }

    pub fn is_expected_status(&self, status: u16) -> bool {
        (self.expected_status_min..=self.expected_status_max).contains(&status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_export: Option<PathBuf>,
}

fn default_report_interval() -> u64 { 10 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
            summary_export: None,
        }
    }
}

impl Config {
    /// Load configuration: scenario file, then `LOADGEN__` environment overrides.
    ///
    /// Without an explicit path `config/default.toml` is used when present,
    /// otherwise the copy compiled into the binary. Scenario keys of each layer
    /// are canonicalised before merging so `LOADGEN__SCENARIOS__X__MAXVUS`
    /// replaces a file's `maxVUs` instead of sitting next to it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("config file {} does not exist", path.display());
                }
                file_provider(path)
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Figment::from(Toml::file(DEFAULT_CONFIG_PATH))
            }
            None => Figment::from(Toml::string(EMBEDDED_DEFAULT)),
        };
        let env = Figment::from(Env::prefixed(ENV_PREFIX).split("__"));

        let figment = Figment::new()
            .merge(Serialized::defaults(canonical_layer(file)?))
            .merge(Serialized::defaults(canonical_layer(env)?));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(LoadgenError::from)
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoadgenError> {
        if self.scenarios.is_empty() {
            return Err(LoadgenError::Config("no scenarios defined".to_string()));
        }
        self.target.parsed_url()?;
        self.target
            .validate()
            .map_err(|e| LoadgenError::InvalidTarget(e.to_string()))?;
        if self.target.expected_status_min > self.target.expected_status_max {
            return Err(LoadgenError::InvalidTarget(
                "expected_status_min is greater than expected_status_max".to_string(),
            ));
        }
        if self.target.timeout.is_zero() {
            return Err(LoadgenError::InvalidTarget("timeout must be greater than zero".to_string()));
        }
        for (name, scenario) in &self.scenarios {
            scenario.check(name)?;
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, LoadgenError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Longest wall-clock time any scenario may take, grace period included.
    pub fn max_run_time(&self) -> Duration {
        self.scenarios
            .values()
            .map(|s| s.start_time + s.duration + s.graceful_stop)
            .max()
            .unwrap_or_default()
    }
}

fn file_provider(path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Figment::from(Json::file(path)),
        _ => Figment::from(Toml::file(path)),
    }
}

/// Extract one provider layer with every scenario key in its camelCase form.
fn canonical_layer(layer: Figment) -> Result<Dict> {
    let mut dict: Dict = layer
        .extract()
        .map_err(LoadgenError::from)
        .context("failed to parse configuration")?;
    if let Some(Value::Dict(_, scenarios)) = dict.get_mut("scenarios") {
        for scenario in scenarios.values_mut() {
            if let Value::Dict(_, fields) = scenario {
                *fields = std::mem::take(fields)
                    .into_iter()
                    .map(|(key, value)| (canonical_key(&key), value))
                    .collect();
            }
        }
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExecutorKind;
    use figment::Jail;

    #[test]
    fn test_embedded_default_matches_declared_scenario() {
        let config = Config::from_figment(Figment::new().merge(Toml::string(EMBEDDED_DEFAULT))).unwrap();
        let scenario = &config.scenarios["constant_request_rate"];
        assert_eq!(scenario.executor, ExecutorKind::ConstantArrivalRate);
        assert_eq!(scenario.rate, Some(50));
        assert_eq!(scenario.time_unit, Duration::from_secs(1));
        assert_eq!(scenario.duration, Duration::from_secs(2 * 3600));
        assert_eq!(scenario.max_vus(), 100);
        assert_eq!(config.target.url, "http://localhost:8080/");
        assert_eq!(config.target.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "scenario.toml",
                r#"
                [target]
                url = "http://127.0.0.1:9000/health"

                [scenarios.smoke]
                executor = "constant-vus"
                vus = 2
                duration = "30s"
                "#,
            )?;
            jail.set_env("LOADGEN__TARGET__URL", "http://127.0.0.1:9001/");
            jail.set_env("LOADGEN__SCENARIOS__SMOKE__VUS", "5");

            let config = Config::load(Some(Path::new("scenario.toml")))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.target.url, "http://127.0.0.1:9001/");
            assert_eq!(config.scenarios["smoke"].vus, Some(5));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_camel_case_file_keys() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "scenario.toml",
                r#"
                [target]
                url = "http://127.0.0.1:9000/"

                [scenarios.constant_request_rate]
                executor = "constant-arrival-rate"
                rate = 50
                timeUnit = "1s"
                duration = "2h"
                preAllocatedVUs = 50
                maxVUs = 100
                "#,
            )?;
            jail.set_env("LOADGEN__SCENARIOS__CONSTANT_REQUEST_RATE__MAXVUS", "200");
            jail.set_env("LOADGEN__SCENARIOS__CONSTANT_REQUEST_RATE__TIMEUNIT", "2s");
            jail.set_env("LOADGEN__SCENARIOS__CONSTANT_REQUEST_RATE__PRE_ALLOCATED_VUS", "60");

            let config = Config::load(Some(Path::new("scenario.toml")))
                .map_err(|e| figment::Error::from(format!("{e:#}")))?;
            let scenario = &config.scenarios["constant_request_rate"];
            assert_eq!(scenario.max_vus, Some(200));
            assert_eq!(scenario.pre_allocated_vus, Some(60));
            assert_eq!(scenario.time_unit, Duration::from_secs(2));
            assert_eq!(scenario.rate, Some(50));
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_embedded_default() {
        Jail::expect_with(|jail| {
            jail.set_env("LOADGEN__SCENARIOS__CONSTANT_REQUEST_RATE__MAXVUS", "150");

            let config = Config::load(None).map_err(|e| figment::Error::from(format!("{e:#}")))?;
            assert_eq!(config.scenarios["constant_request_rate"].max_vus(), 150);
            Ok(())
        });
    }

    #[test]
    fn test_json_scenario_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "scenario.json",
                r#"{
                    "target": { "url": "http://localhost:3000/" },
                    "scenarios": {
                        "constant_request_rate": {
                            "executor": "constant-arrival-rate",
                            "rate": 50,
                            "timeUnit": "1s",
                            "duration": "2h",
                            "preAllocatedVUs": 100,
                            "maxVUs": 100
                        }
                    }
                }"#,
            )?;
            let config = Config::load(Some(Path::new("scenario.json")))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(
                config.scenarios["constant_request_rate"].planned_iterations(),
                Some(360_000)
            );
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        Jail::expect_with(|_jail| {
            assert!(Config::load(Some(Path::new("nope.toml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_executor_names_scenario() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [target]
            url = "http://localhost:8080/"

            [scenarios.ramp]
            executor = "ramping-vus"
            duration = "1m"
            "#,
        ));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(format!("{err:#}").contains("scenarios.ramp"));
    }

    #[test]
    fn test_rejects_non_http_target() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [target]
            url = "ftp://localhost/file"

            [scenarios.smoke]
            executor = "constant-vus"
            duration = "1m"
            "#,
        ));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_empty_scenarios_rejected() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            scenarios = {}
            [target]
            url = "http://localhost:8080/"
            "#,
        ));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_to_toml_renders_durations() {
        let config = Config::from_figment(Figment::new().merge(Toml::string(EMBEDDED_DEFAULT))).unwrap();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("duration = \"2h\""));
        assert!(rendered.contains("timeUnit = \"1s\""));
        assert!(rendered.contains("maxVUs = 100"));
    }

    #[test]
    fn test_status_range() {
        let config = Config::from_figment(Figment::new().merge(Toml::string(EMBEDDED_DEFAULT))).unwrap();
        assert!(config.target.is_expected_status(200));
        assert!(config.target.is_expected_status(304));
        assert!(!config.target.is_expected_status(404));
        assert!(!config.target.is_expected_status(503));
    }
}
