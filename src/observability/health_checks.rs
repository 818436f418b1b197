//! Health check functionality module.
//!
//! This module provides:
//! - Storage directory writability checks
//! - Remote store reachability checks (used by the client)
//! - Readiness checks for the metrics endpoint

use std::time::Duration;

use anyhow::Result;

use crate::config::StoreConfig;

/// Perform readiness checks for the configured storage, if any
pub fn perform_readiness_checks(store: Option<&StoreConfig>) -> Result<()> {
    match store {
        Some(store) => check_storage_health(store),
        None => Ok(()),
    }
}

/// Check that both store directories exist and accept new files
pub fn check_storage_health(store: &StoreConfig) -> Result<()> {
    for dir in [&store.upload_dir, &store.processed_dir] {
        if !dir.is_dir() {
            return Err(anyhow::anyhow!(
                "Storage health check failed: {} is not a directory",
                dir.display()
            ));
        }

        // Probe file is removed when dropped
        tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            anyhow::anyhow!("Storage health check failed: {} is not writable: {}", dir.display(), e)
        })?;
    }

    tracing::debug!("Storage health check passed");
    Ok(())
}

/// Check that a remote store answers its liveness probe
pub async fn check_store_reachable(base_url: &str, timeout: Duration) -> Result<()> {
    let url = reqwest::Url::parse(base_url)
        .and_then(|base| base.join("/health/live"))
        .map_err(|e| anyhow::anyhow!("Invalid store URL {}: {}", base_url, e))?;

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Store health check failed: {}", e))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Store health check failed: HTTP {}",
            response.status()
        ));
    }

    tracing::debug!(url = %base_url, "Store reachability check passed");
    Ok(())
}

/// Start a background task to periodically record health check metrics
pub fn start_health_metrics_recorder(store: StoreConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let check_start = std::time::Instant::now();
            let storage_healthy = check_storage_health(&store).is_ok();
            crate::observability::metrics::record_health_check_metrics(
                "storage",
                storage_healthy,
                check_start.elapsed(),
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_health_requires_directories() {
        let base = tempfile::tempdir().expect("temp dir");
        let config = StoreConfig::rooted_at(base.path());

        assert!(check_storage_health(&config).is_err());

        std::fs::create_dir_all(&config.upload_dir).expect("create uploads");
        std::fs::create_dir_all(&config.processed_dir).expect("create processed");
        assert!(check_storage_health(&config).is_ok());

        // Probe files must not linger
        assert_eq!(std::fs::read_dir(&config.upload_dir).expect("read uploads").count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_not_ready() {
        let result =
            check_store_reachable("http://127.0.0.1:1", Duration::from_millis(500)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_readiness_with_nothing_configured() {
        assert!(perform_readiness_checks(None).is_ok());
    }
}
