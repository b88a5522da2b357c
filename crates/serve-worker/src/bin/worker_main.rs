//! Model worker entry point
//!
//! Resolves the configuration, binds the socket, serves the orchestrator's
//! connection and exits. Any startup failure exits non-zero before a single
//! frame is exchanged.

use anyhow::{Context, Result};
use tracing::{error, info};

use serve_worker::config::LoggingConfig;
use serve_worker::{Server, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = WorkerConfig::load().context("Failed to load configuration")?;

    init_logging(&config.logging)?;

    info!("Model worker starting (pid {})", std::process::id());
    config.print_summary();

    let server = Server::initialize(config)
        .await
        .context("Failed to initialize worker")?;

    tokio::select! {
        result = server.run() => {
            result.context("Serving loop failed")?;
            info!("Peer disconnected, shutting down");
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping worker...");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C signal"),
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

fn init_logging(logging_config: &LoggingConfig) -> Result<()> {
    let filter = logging_config.level().unwrap_or_else(|| {
        eprintln!("Invalid log level: {}, using 'info'", logging_config.log_level);
        "info"
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(())
}
