//! SeatWatch Sampler - Main entry point
//!
//! Loads configuration, opens the store, registers providers and runs the
//! sampling scheduler until SIGINT/SIGTERM.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use seatwatch_common::config::resolve_config_path;
use seatwatch_common::db::init_database;
use seatwatch_sampler::{registry_from_config, AppConfig, Scheduler, SchedulerContext};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for seatwatch-sampler
#[derive(Parser, Debug)]
#[command(name = "seatwatch-sampler")]
#[command(about = "Seat availability sampler for SeatWatch")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overrides `database_path` from the config file
    #[arg(short, long, env = "SEATWATCH_DATABASE")]
    database: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG and the config file (e.g. "debug")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&args, &config).context("Failed to initialize logging")?;

    info!("Starting SeatWatch Sampler v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.bootstrap.database_path());
    info!("Database: {}", db_path.display());

    let max_connections = (config.sampler.write_concurrency + 2) as u32;
    let pool = init_database(&db_path, max_connections)
        .await
        .context("Failed to open database")?;

    config
        .sampler
        .apply_settings(&pool)
        .await
        .context("Failed to read sampler settings from database")?;
    config.validate().context("Invalid configuration")?;

    let providers = registry_from_config(&config.providers).context("Failed to build providers")?;
    if providers.is_empty() {
        tracing::warn!("No providers configured, every showing will be unclassified");
    }

    let ctx = Arc::new(SchedulerContext::new(pool.clone(), &config, providers).context("Failed to build scheduler")?);
    let scheduler = Scheduler::new(ctx);

    let token = scheduler.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    scheduler.run().await.context("Scheduler error")?;

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(args: &Args, config: &AppConfig) -> Result<()> {
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.bootstrap.logging.level))?,
    };

    let file_layer = match &config.bootstrap.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
