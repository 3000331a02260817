use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::telemetry::LogFormat;

/// Declarative HTTP load generator
#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(about = "Replay declarative traffic scenarios against an HTTP endpoint")]
#[command(version)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true, env = "LOADGEN_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run every scenario in the configuration
    Run(RunArgs),

    /// Check the configuration and print the planned load
    Validate(ConfigArgs),

    /// Print the resolved configuration as TOML
    Inspect(ConfigArgs),

    /// Send a single GET to check the target is reachable
    Probe(ProbeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Scenario file (TOML or JSON); defaults to config/default.toml
    #[arg(short, long, env = "LOADGEN_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override the target URL
    #[arg(long)]
    pub url: Option<String>,

    /// Write the end-of-test summary as JSON to this file
    #[arg(long)]
    pub summary_export: Option<PathBuf>,

    /// Progress log interval in seconds (0 disables)
    #[arg(long)]
    pub report_interval: Option<u64>,

    /// Skip the reachability probe before starting
    #[arg(long)]
    pub no_probe: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override the target URL
    #[arg(long)]
    pub url: Option<String>,
}
