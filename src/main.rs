//! OpsPulse service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ SetRequestId → Trace → instrumentation ──▶ handler
//!                                              │                  │
//!                                              ▼                  ▼
//!                                      ServiceMetrics ◀──── ChaosState
//!                                              │
//!   GET /metrics ◀─────────────── text exposition
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use opspulse::config::{self, ServiceConfig};
use opspulse::lifecycle::{signals, Shutdown};
use opspulse::observability::logging;
use opspulse::HttpServer;

#[derive(Parser)]
#[command(name = "opspulse")]
#[command(about = "OpsPulse monitoring demo service", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "OPSPULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        config::validate_config(&config).map_err(config::ConfigError::Validation)?;
    }

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        initial_chaos_mode = %config.chaos.initial_mode,
        slow_delay_ms = config.chaos.slow_delay_ms,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::shutdown_signal().await;
        shutdown.trigger();
    });

    let server = HttpServer::new(config)?;
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
