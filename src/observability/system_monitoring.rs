//! Process and store resource gauges, refreshed by a background task.

use std::path::Path;
use std::time::Instant;

use crate::config::StoreConfig;

/// Record resident memory of this process (Linux only)
pub fn record_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            // Second field is the resident set size in pages
            if let Some(rss) = statm.split_whitespace().nth(1) {
                if let Ok(pages) = rss.parse::<u64>() {
                    let memory_mb = (pages * 4) as f64 / 1024.0;
                    metrics::gauge!("process_memory_mb").set(memory_mb);
                }
            }
        }
    }
}

/// Number of regular files and their total size in `dir`.
pub fn directory_usage(dir: &Path) -> (u64, u64) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (0, 0);
    };

    entries
        .flatten()
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .fold((0, 0), |(count, bytes), meta| (count + 1, bytes + meta.len()))
}

/// Record blob counts and bytes held by each store area
pub fn record_store_usage(store: &StoreConfig) {
    for (area, dir) in [("uploads", &store.upload_dir), ("processed", &store.processed_dir)] {
        let (count, bytes) = directory_usage(dir);
        metrics::gauge!("store_blobs", "area" => area.to_string()).set(count as f64);
        metrics::gauge!("store_bytes", "area" => area.to_string()).set(bytes as f64);
    }
}

/// Start a background task that refreshes resource gauges every 30 seconds
pub fn start_system_metrics_recorder(store: Option<StoreConfig>) -> tokio::task::JoinHandle<()> {
    let started = Instant::now();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));

        loop {
            interval.tick().await;

            record_memory_usage();
            if let Some(store) = &store {
                record_store_usage(store);
            }
            metrics::gauge!("application_uptime_seconds").set(started.elapsed().as_secs_f64());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_usage_counts_files_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("a.png"), [0u8; 10]).expect("write a");
        std::fs::write(dir.path().join("b.png"), [0u8; 5]).expect("write b");
        std::fs::create_dir(dir.path().join("nested")).expect("create nested");

        assert_eq!(directory_usage(dir.path()), (2, 15));
    }

    #[test]
    fn test_directory_usage_missing_dir() {
        assert_eq!(directory_usage(Path::new("/definitely/not/here")), (0, 0));
    }
}
