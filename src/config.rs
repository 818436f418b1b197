//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all application settings into a single, structured configuration object.
//! Storage locations are carried explicitly in [`StoreConfig`] and handed to
//! the store at construction; nothing here is process-wide state.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::path_validation::DEFAULT_ALLOWED_EXTENSIONS;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default limit for uploaded and downloaded blobs (16 MiB)
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 16 * 1024 * 1024;

/// Blob store server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding uploaded source images
    pub upload_dir: PathBuf,
    /// Directory holding processed images
    pub processed_dir: PathBuf,
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Port the HTTP server listens on
    pub port: u16,
    /// Maximum accepted request body in bytes
    pub max_content_length: u64,
    /// Accepted image extensions (lower case, no dot)
    pub allowed_extensions: Vec<String>,
    /// Whether to allow privileged ports (< 1024)
    pub allow_privileged_ports: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static/uploads"),
            processed_dir: PathBuf::from("static/processed"),
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            allow_privileged_ports: false,
        }
    }
}

impl StoreConfig {
    /// Store configuration rooted in a single base directory.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            upload_dir: base.join("uploads"),
            processed_dir: base.join("processed"),
            ..Self::default()
        }
    }

    /// Validate store configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Upload directory cannot be empty".to_string()));
        }

        if self.processed_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Processed directory cannot be empty".to_string()));
        }

        if self.upload_dir == self.processed_dir {
            return Err(AppError::Config(
                "Upload and processed directories must differ".to_string(),
            ));
        }

        if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(AppError::Config(format!(
                "Bind address '{}' is not a valid IP address",
                self.bind_address
            )));
        }

        if !self.allow_privileged_ports && self.port != 0 && self.port < 1024 {
            return Err(AppError::Config(format!(
                "Store port {} is privileged. Set allow_privileged_ports=true or use port >= 1024",
                self.port
            )));
        }

        if self.max_content_length == 0 {
            return Err(AppError::Config("Max content length cannot be 0".to_string()));
        }

        if self.allowed_extensions.is_empty() {
            return Err(AppError::Config(
                "At least one allowed extension is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Client-side settings for the orchestrator and menu
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the blob store
    pub server_url: String,
    /// HTTP client timeout in seconds, applied to every request
    pub http_timeout_secs: u64,
    /// Directory receiving locally deposited results
    pub local_output_dir: PathBuf,
    /// Largest blob the client will download
    pub max_download_size: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            http_timeout_secs: 30,
            local_output_dir: PathBuf::from("processed_images"),
            max_download_size: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(AppError::Config("Server URL cannot be empty".to_string()));
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Server URL must start with 'http://' or 'https://': {}",
                self.server_url
            )));
        }

        if reqwest::Url::parse(&self.server_url).is_err() {
            return Err(AppError::Config(format!(
                "Server URL is not a valid URL: {}",
                self.server_url
            )));
        }

        if self.http_timeout_secs == 0 {
            return Err(AppError::Config("HTTP timeout cannot be 0".to_string()));
        }

        if self.http_timeout_secs > 300 {
            return Err(AppError::Config(
                "HTTP timeout cannot be greater than 300 seconds".to_string(),
            ));
        }

        if self.local_output_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Local output directory cannot be empty".to_string()));
        }

        if self.max_download_size == 0 {
            return Err(AppError::Config("Max download size cannot be 0".to_string()));
        }

        Ok(())
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Store server configuration
    pub store: StoreConfig,
    /// Client configuration
    pub client: ClientConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T, what: &str) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be {}", key, what))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Load store configuration
        if let Ok(dir) = env::var("STORE_UPLOAD_DIR") {
            config.store.upload_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("STORE_PROCESSED_DIR") {
            config.store.processed_dir = PathBuf::from(dir);
        }
        if let Ok(address) = env::var("STORE_BIND_ADDRESS") {
            config.store.bind_address = address;
        }
        config.store.port = env_or("STORE_PORT", config.store.port, "a valid port number")?;
        config.store.max_content_length = env_or(
            "STORE_MAX_CONTENT_LENGTH",
            config.store.max_content_length,
            "a valid number of bytes",
        )?;
        config.store.allow_privileged_ports = env::var("ALLOW_PRIVILEGED_PORTS")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        // Load client configuration
        if let Ok(url) = env::var("OTSU_SERVER_URL") {
            config.client.server_url = url;
        }
        config.client.http_timeout_secs = env_or(
            "HTTP_CLIENT_TIMEOUT_SECS",
            config.client.http_timeout_secs,
            "a valid number",
        )?;
        if let Ok(dir) = env::var("LOCAL_OUTPUT_DIR") {
            config.client.local_output_dir = PathBuf::from(dir);
        }
        config.client.max_download_size = env_or(
            "MAX_DOWNLOAD_SIZE",
            config.client.max_download_size,
            "a valid number of bytes",
        )?;

        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.store.validate()?;
        self.client.validate()?;
        self.observability.validate().map_err(AppError::Config)?;

        if self.store.port == self.observability.metrics_port {
            return Err(AppError::Config(
                "Store port and metrics port cannot be the same".to_string(),
            ));
        }

        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: upload_dir={}, processed_dir={}, store_port={}, server_url={}, http_timeout_secs={}, local_output_dir={}, metrics_port={}",
            self.store.upload_dir.display(),
            self.store.processed_dir.display(),
            self.store.port,
            self.client.server_url,
            self.client.http_timeout_secs,
            self.client.local_output_dir.display(),
            self.observability.metrics_port
        )
    }
}
