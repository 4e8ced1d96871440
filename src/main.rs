//! suptank - supervisory server for a two-tank process plant
//!
//! Serves plant readings and actuator commands to authenticated clients over TCP.

use std::sync::Arc;
use suptank_plant::TankSimulator;
use suptank_server::{Config, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if SUPTANK_CONFIG is set, then env overrides)
    let config_path = std::env::var("SUPTANK_CONFIG").ok();
    let mut config = match Config::load() {
        Ok(c) => {
            if let Some(ref path) = config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.load_users_file() {
        tracing::error!("Failed to load users file: {}", e);
        return Err(e.into());
    }
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    let directory = config.directory()?;
    if directory.is_empty() {
        tracing::warn!("No users configured; every login will be rejected");
    }

    tracing::info!("Starting suptank server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Readiness timeout: {:?}", config.network.wait_timeout());
    tracing::info!("  Users: {}", directory.len());
    if config.plant.tick_ms == 0 {
        tracing::info!("  Plant simulation: paused");
    } else {
        tracing::info!("  Plant simulation: tick {:?}", config.plant.tick());
    }

    let plant = Arc::new(TankSimulator::with_params(config.plant.simulator));
    let server = Server::with_directory(config.server_config(), plant, directory);

    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping server...");

    if let Some(exit) = server.stop().await {
        if exit.is_fatal() {
            tracing::error!("Dispatcher had already failed: {:?}", exit);
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
