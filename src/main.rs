use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pulsekeeper::config::{LoggingConfig, PulseConfig};
use pulsekeeper::guard::Guard;
use pulsekeeper::heart::{Heart, LogObserver};

/// Heartbeat scheduler and admission throttle for P2P nodes.
#[derive(Debug, Parser)]
#[command(name = "pulsekeeper", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, overrides the configuration file
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PulseConfig::from_file(path)?,
        None => PulseConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json_logs;

    init_tracing(&config.logging);

    info!("Starting Pulsekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        beat_interval_secs = config.beat_interval_secs,
        throttle_gate_secs = config.throttle_gate().as_secs(),
        key_by_port = config.guard.key_by_port,
        "Configuration loaded"
    );

    // The accept path of the embedding node consults this guard.
    let guard = Arc::new(Guard::new(&config)?);
    info!(gate_secs = guard.gate().as_secs(), "Guard initialized");

    let heart = Heart::builder(&config)
        .observer(Arc::new(LogObserver))
        .build()?;
    if !heart.is_running() {
        heart.start()?;
    }

    shutdown_signal().await;

    heart.shutdown().await;
    info!(
        snapshot = %serde_json::to_string(&heart.snapshot())?,
        tracked_sources = guard.tracked_keys(),
        "Pulsekeeper stopped"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
