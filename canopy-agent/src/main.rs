use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use canopy_config::{CollectorConfig, ConfigLoad, ConfigLoader};
use canopy_core::{CycleSummary, Orchestrator};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod drain;
mod fetchers;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "canopy-agent")]
#[command(about = "Periodically collects resource inventory from configured sources")]
struct Cli {
    /// Path to the TOML configuration file; falls back to CANOPY_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a .env file with CANOPY_* overrides
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Run a single collection cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let registry = fetchers::build_registry(&config)?;
    info!(fetchers = registry.len(), "fetchers registered");

    let (tx, rx) = mpsc::channel(config.output_capacity);
    let evaluator = tokio::spawn(drain::drain(rx));
    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator(),
        Arc::new(registry),
        tx,
    ));

    if cli.once {
        let summary = orchestrator
            .run_once()
            .await
            .context("collection cycle failed")?;
        log_summary(&summary);
        orchestrator.stop();
    } else {
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

        let run = orchestrator.run(cancel).await;
        orchestrator.stop();
        run.context("orchestrator failed")?;
    }

    // Fetchers that ignore cancellation keep the stream open; do not wait on
    // them longer than a single fetcher may run.
    match tokio::time::timeout(config.fetcher_timeout, evaluator).await {
        Ok(joined) => {
            let delivered = joined.context("resource consumer task failed")?;
            info!(resources = delivered, "canopy agent exiting");
        }
        Err(_) => warn!("resource stream still open at exit, abandoning remaining fetchers"),
    }
    Ok(())
}

/// Only explicit flags go to the loader; CANOPY_CONFIG is resolved there so
/// a `.env` file can set it too.
fn config_loader(cli: &Cli) -> ConfigLoader {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    loader
}

fn load_config(cli: &Cli) -> anyhow::Result<CollectorConfig> {
    let ConfigLoad { config, warnings } = config_loader(cli)
        .load()
        .context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        period = %humantime::format_duration(config.period),
        fetcher_timeout = %humantime::format_duration(config.fetcher_timeout),
        output_capacity = config.output_capacity,
        region = %config.cloud.region,
        "collector configured"
    );

    Ok(config)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received Ctrl-C, shutting down");
            cancel.cancel();
        }
        Err(err) => error!(error = %err, "failed to listen for Ctrl-C"),
    }
}

fn log_summary(summary: &CycleSummary) {
    info!(
        cycle = summary.cycle.sequence,
        succeeded = summary.succeeded.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "single cycle finished"
    );
    for (fetcher, err) in &summary.failed {
        error!(fetcher = %fetcher, error = %err, "fetcher failed");
    }
}
