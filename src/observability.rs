//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Metrics collection and Prometheus export
//! - Distributed tracing with OpenTelemetry
//! - Structured logging with configurable levels
//! - Health check endpoints for monitoring
//! - Environment-specific configuration support

pub mod health_checks;
pub mod metrics;
pub mod system_monitoring;
pub mod tracing_mod;

use std::net::SocketAddr;

use anyhow::Result;

use crate::config::StoreConfig;
use crate::observability_config::ObservabilityConfig;

pub use self::metrics::{
    record_blob_stored, record_error_metrics, record_health_check_metrics,
    record_pipeline_metrics, record_request_metrics, record_stage_metrics,
    record_startup_metrics, record_threshold_metrics, record_transfer_metrics,
};
pub use self::tracing_mod::{http_span, pipeline_span, stage_span};

/// Initialize the complete observability stack for the store server.
///
/// Returns the address of the metrics server when metrics export is enabled.
pub async fn init_observability_with_config(
    config: ObservabilityConfig,
    store: Option<StoreConfig>,
) -> Result<Option<SocketAddr>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    // Initialize tracing first
    tracing_mod::init_tracing_with_config(&config)?;
    tracing_mod::init_opentelemetry_tracing_with_config(&config)?;

    let metrics_addr = if config.enable_metrics_export {
        let metrics_handle = metrics::init_metrics_with_config(&config)?;
        let addr =
            metrics::start_metrics_server(metrics_handle, config.metrics_port, store.clone())
                .await?;
        system_monitoring::start_system_metrics_recorder(store.clone());
        if let Some(store) = store {
            health_checks::start_health_metrics_recorder(store);
        }
        Some(addr)
    } else {
        None
    };

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        metrics_addr = ?metrics_addr,
        "Observability stack initialized successfully"
    );
    Ok(metrics_addr)
}

/// Initialize logging and trace export for the interactive client.
///
/// The client never serves metrics; its logs go to stderr so the menu on
/// stdout stays readable.
pub fn init_client_observability(config: &ObservabilityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    tracing_mod::init_tracing_with_config(config)?;
    tracing_mod::init_opentelemetry_tracing_with_config(config)?;
    Ok(())
}
