use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use otsu_relay::config::AppConfig;
use otsu_relay::errors::error_logging;
use otsu_relay::observability;
use otsu_relay::store::{spawn_store_server, BlobStorage};
use tracing::info;

/// Blob store server for Otsu binarization
#[derive(Debug, Parser)]
#[command(name = "otsu-relay", version, about)]
struct Cli {
    /// Port to listen on (overrides STORE_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides STORE_BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,

    /// Directory for uploaded images (overrides STORE_UPLOAD_DIR)
    #[arg(long)]
    upload_dir: Option<PathBuf>,

    /// Directory for processed images (overrides STORE_PROCESSED_DIR)
    #[arg(long)]
    processed_dir: Option<PathBuf>,
}

/// Load configuration from the environment and apply command line overrides
fn load_configuration(cli: Cli) -> Result<AppConfig> {
    let mut config = AppConfig::from_env().map_err(|e| {
        error_logging::log_config_error(&e, "environment", "load_configuration");
        anyhow::anyhow!("{}", e)
    })?;

    if let Some(port) = cli.port {
        config.store.port = port;
    }
    if let Some(bind) = cli.bind {
        config.store.bind_address = bind;
    }
    if let Some(dir) = cli.upload_dir {
        config.store.upload_dir = dir;
    }
    if let Some(dir) = cli.processed_dir {
        config.store.processed_dir = dir;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup = Instant::now();

    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = load_configuration(Cli::parse())?;

    // Initialize complete observability stack (metrics, tracing, logging)
    observability::init_observability_with_config(
        config.observability.clone(),
        Some(config.store.clone()),
    )
    .await?;

    info!("{}", config.summary());

    let bind_ip: IpAddr = config
        .store
        .bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", config.store.bind_address, e))?;
    let storage = Arc::new(
        BlobStorage::new(config.store.clone())
            .map_err(|e| anyhow::anyhow!("Failed to prepare storage: {}", e))?,
    );

    let (addr, server) =
        spawn_store_server(storage, SocketAddr::new(bind_ip, config.store.port)).await?;
    observability::record_startup_metrics(startup.elapsed());
    info!(address = %addr, "Otsu relay store started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = server => {
            if let Err(e) = result {
                error_logging::log_internal_error(&e, "store_server", "accept_loop");
            }
        }
    }

    Ok(())
}
