//! # relevel
//!
//! Runs a level-triggered controller over a seeded in-memory source.
//!
//! ## Commands
//!
//! - `relevel run --config <file>`: seed documents, sync them until Ctrl+C
//! - `relevel check-config --config <file>`: validate and print the settings
//!
//! ## Shutdown
//!
//! Ctrl+C cancels the controller; the process exits once every worker has
//! finished its in-flight sync.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use relevel_events::LoggingRecorder;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use crate::demo::DemoConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            workers,
            resync_secs,
        } => {
            let config = DemoConfig::load(&config)?.with_overrides(workers, resync_secs);
            config.controller.validate()?;

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    wait_for_shutdown().await;
                    cancel.cancel();
                }
            });

            info!("relevel is running. Press Ctrl+C to stop.");
            demo::run(&config, &LoggingRecorder::new("relevel"), cancel).await?;
            info!("relevel stopped gracefully");
            Ok(())
        }
        Commands::CheckConfig { config } => {
            let config = DemoConfig::load(&config)?;
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration")?;
            println!("{json}");
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
