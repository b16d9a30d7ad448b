// src/main.rs

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use sitepulse::core::batch::{TargetOutcome, TaskRegistry};
use sitepulse::logging::initialize_logging;
use sitepulse::{ProbeConfig, ProbeOptions, Prober, TransportMode};

/// Probe websites and score their performance and security posture.
#[derive(Debug, Parser)]
#[command(name = "sitepulse", version, about)]
struct Cli {
    /// Targets to probe. A missing scheme defaults to http://.
    #[arg(required = true)]
    urls: Vec<String>,

    /// YAML file with probe settings.
    #[arg(short, long, env = "SITEPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Skip sub-resource sizing.
    #[arg(long)]
    no_resources: bool,

    /// Maximum number of resources sized per kind.
    #[arg(long, default_value_t = 20)]
    resource_limit: usize,

    /// Skip the multi-resolver check and the signal detectors.
    #[arg(long)]
    basic: bool,

    /// Transport for the primary fetch: auto, instrumented or coarse.
    #[arg(long)]
    transport: Option<TransportMode>,

    /// Print flat JSON records instead of the summary lines.
    #[arg(long)]
    json: bool,

    /// Mirror logs to stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    initialize_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => ProbeConfig::from_yaml_file(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(mode) = cli.transport {
        config.transport = mode;
    }
    if cli.basic {
        config.multi_resolver = false;
    }

    let options = ProbeOptions {
        fetch_resources: !cli.no_resources,
        resource_limit: cli.resource_limit,
        check_advanced: !cli.basic,
    };

    let prober = Arc::new(Prober::new(config)?);
    let registry = TaskRegistry::new();
    let (id, handle) = registry.submit(prober, cli.urls, options).await;
    handle.await?;

    let state = registry
        .get(id)
        .await
        .ok_or_else(|| eyre!("task {} vanished before completion", id))?;
    info!(task = %id, status = %state.status, progress = state.progress, "Printing results.");

    if cli.json {
        let rows: Vec<serde_json::Value> = state
            .results
            .iter()
            .map(|outcome| match outcome {
                TargetOutcome::Report(report) => serde_json::to_value(report.to_flat_record()),
                TargetOutcome::Failed { url, error } => Ok(serde_json::json!({ "url": url, "error": error })),
            })
            .collect::<std::result::Result<_, _>>()?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for outcome in &state.results {
            match outcome {
                TargetOutcome::Report(report) => {
                    for line in report.display_lines() {
                        println!("{}", line);
                    }
                }
                TargetOutcome::Failed { url, error } => println!("URL: {}\nError: {}", url, error),
            }
            println!();
        }
    }

    registry.clear(id).await;
    Ok(())
}
