use anyhow::{Context, Result};
use arrival_loadgen::cli::{Cli, Command, ConfigArgs, ProbeArgs, RunArgs};
use arrival_loadgen::{config::Config, domain::format_duration, telemetry, HttpGetAction, TestRun};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format, cli.verbose);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate(args) => validate(args),
        Command::Inspect(args) => {
            let cfg = load(&args)?;
            print!("{}", cfg.to_toml()?);
            Ok(())
        }
        Command::Probe(args) => probe(args).await,
    }
}

fn load(args: &ConfigArgs) -> Result<Config> {
    Config::load(args.config.as_deref())
}

fn with_url(mut cfg: Config, url: Option<String>) -> Result<Config> {
    if let Some(url) = url {
        cfg.target.url = url;
        cfg.validate().context("invalid --url")?;
    }
    Ok(cfg)
}

async fn run(args: RunArgs) -> Result<()> {
    let mut cfg = with_url(load(&args.config)?, args.url)?;
    if let Some(path) = args.summary_export {
        cfg.output.summary_export = Some(path);
    }
    if let Some(secs) = args.report_interval {
        cfg.output.report_interval_secs = secs;
    }

    if !args.no_probe {
        let report = HttpGetAction::new(&cfg.target)?
            .probe()
            .await
            .with_context(|| format!("target {} is not reachable", cfg.target.url))?;
        if report.expected {
            info!(status = report.status, latency_ms = report.latency_ms, "target reachable");
        } else {
            warn!(status = report.status, "target answered with an unexpected status");
        }
    }

    let cancel = CancellationToken::new();
    telemetry::cancel_on_shutdown(cancel.clone());

    let run = TestRun::new(cfg)?;
    let summary = run.execute(cancel).await?;
    println!("{}", summary.render_text());
    Ok(())
}

fn validate(args: ConfigArgs) -> Result<()> {
    let cfg = load(&args)?;
    println!("configuration OK: target {}", cfg.target.url);
    for (name, scenario) in &cfg.scenarios {
        let load = match scenario.planned_iterations() {
            Some(planned) => format!(
                "{} iterations per {}, {} planned, {}-{} VUs",
                scenario.rate.unwrap_or_default(),
                format_duration(scenario.time_unit),
                planned,
                scenario.initial_vus(),
                scenario.max_vus()
            ),
            None => format!("{} VUs", scenario.initial_vus()),
        };
        println!(
            "  {name}: {} for {} ({load})",
            scenario.executor,
            format_duration(scenario.duration)
        );
    }
    println!("  max run time: {}", format_duration(cfg.max_run_time()));
    Ok(())
}

async fn probe(args: ProbeArgs) -> Result<()> {
    let cfg = with_url(load(&args.config)?, args.url)?;
    let report = HttpGetAction::new(&cfg.target)?
        .probe()
        .await
        .with_context(|| format!("target {} is not reachable", cfg.target.url))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.expected {
        anyhow::bail!("unexpected status {} from {}", report.status, report.url);
    }
    Ok(())
}
