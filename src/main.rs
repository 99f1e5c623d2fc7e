use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use gethostname::gethostname;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logforward_agent::Agent;

mod config;
mod logging;
mod telemetry;

/// logforward - tails log files by glob pattern and forwards structured entries to stdout
#[derive(Parser, Debug)]
#[command(name = "logforward")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML (or .toml) configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Address for the Prometheus metrics endpoint; empty disables it
    #[arg(long, default_value = ":8080")]
    metrics_addr: String,

    /// Log verbosity; overrides RUST_LOG
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_logging(args.log_level);

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let settings = config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    let hostname = gethostname()
        .into_string()
        .map_err(|_| anyhow!("could not get hostname: not valid UTF-8"))?;

    if let Some(addr) = telemetry::parse_listen_addr(&args.metrics_addr)? {
        telemetry::install_exporter(addr)?;
        info!(%addr, "metrics server listening");
    }

    let agent = Agent::new(settings, hostname)
        .context("invalid configuration")?
        .with_metrics(Arc::new(telemetry::PrometheusMetrics::new()));

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    agent.run(shutdown).await;
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
#[cfg(unix)]
async fn wait_for_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn wait_for_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        return;
    }
    shutdown.cancel();
}
