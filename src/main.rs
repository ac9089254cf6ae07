use anyhow::Result;
use clap::Parser;
use enyaq2mqtt::bridge::EnyaqBridge;
use enyaq2mqtt::config::Config;
use enyaq2mqtt::skoda::SkodaConnectApi;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "enyaq2mqtt")]
#[command(about = "Skoda Enyaq to MQTT bridge with Home Assistant discovery")]
struct Cli {
    /// Path to a JSON configuration file; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    enyaq2mqtt::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let api = SkodaConnectApi::new(Duration::from_secs(config.command_timeout_secs))
        .map_err(|e| anyhow::anyhow!("Failed to create Skoda Connect client: {}", e))?;

    let mut bridge = EnyaqBridge::new(config, Arc::new(api));

    // Signal-driven shutdown: the listener only flips the shutdown handle;
    // the bridge drains at its next suspension point
    let shutdown = bridge.shutdown_handle();
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination signal received, shutting down");
        shutdown.request_stop();
    });

    match bridge.run().await {
        Ok(()) => {
            info!("Bridge shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Bridge failed with error: {}", e);
            Err(anyhow::anyhow!("Bridge error: {}", e))
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
