//! hexrelay
//!
//! Interactive TCP relay for inspecting and tampering with traffic.
//!
//! This service:
//! - Listens on a local address and dials a fixed remote for every client
//! - Drains each side in turn, bounded by an idle timeout
//! - Logs and hex dumps everything it sees
//! - Passes every buffer through operator-configurable hooks before forwarding

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hexrelay::cli::{Cli, LogFormat};
use hexrelay::config::Config;
use hexrelay::error::print_error;
use hexrelay::relay::Listener;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_cli(Cli::parse())?;

    // Initialize tracing (prefer RUST_LOG, fallback to --log-level)
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    if let Err(e) = run(config).await {
        print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    info!("Starting hexrelay");
    info!(
        bind = %config.listener.bind,
        remote = %config.listener.session.remote,
        receive_first = config.listener.session.receive_first,
        idle_timeout_ms = config.listener.session.idle_timeout.as_millis() as u64,
        hooks = ?config.hooks,
        "Configuration loaded"
    );

    let hooks = config.hooks.build();
    let listener = match Listener::bind(config.listener, hooks).await {
        Ok(listener) => Arc::new(listener),
        Err(e) => {
            error!(error = %e, "Failed to bind listener");
            return Err(e.into());
        }
    };

    tokio::select! {
        _ = Arc::clone(&listener).run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}
