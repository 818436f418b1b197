//! Remote blob store access.
//!
//! [`RemoteStore`] is the seam the orchestrator depends on; [`HttpStoreClient`]
//! implements it against the store server with reqwest. Every request is
//! bounded by the client timeout and downloads land in a temporary file that
//! is removed when the returned [`FetchedBlob`] is dropped.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::errors::{error_logging, AppError, AppResult};
use crate::observability;
use crate::path_validation::secure_filename;
use crate::pipeline_errors::PipelineError;
use crate::store::storage::content_type_for;
use crate::store::{BlobEntry, ErrorResponse, UploadResponse};

/// Where a deposited blob ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    /// Stored name
    pub name: String,
    /// Absolute URL or local path of the stored blob
    pub locator: String,
}

/// A downloaded blob backed by a temporary file
#[derive(Debug)]
pub struct FetchedBlob {
    /// Name of the blob, taken from the last path segment of its URL
    pub name: String,
    pub size: u64,
    file: NamedTempFile,
}

impl FetchedBlob {
    /// Wrap an already written temporary file.
    pub fn from_temp_file(name: impl Into<String>, file: NamedTempFile) -> Self {
        let size = file.as_file().metadata().map(|meta| meta.len()).unwrap_or(0);
        Self {
            name: name.into(),
            size,
            file,
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Operations the orchestrator needs from a blob store
pub trait RemoteStore: Send + Sync {
    /// List the blobs available for processing
    fn list_available(&self) -> impl Future<Output = Result<Vec<BlobEntry>, PipelineError>> + Send;

    /// Download a blob by name or URL
    fn fetch(&self, locator: &str) -> impl Future<Output = Result<FetchedBlob, PipelineError>> + Send;

    /// Upload processed bytes under `name`
    fn deposit(
        &self,
        name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<Deposit, PipelineError>> + Send;
}

/// First listed blob whose name contains `pattern`
pub fn find_blob<'a>(entries: &'a [BlobEntry], pattern: &str) -> Option<&'a BlobEntry> {
    entries.iter().find(|entry| entry.name.contains(pattern))
}

/// reqwest-backed [`RemoteStore`]
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    client: reqwest::Client,
    base_url: Url,
    max_download_size: u64,
}

impl HttpStoreClient {
    pub fn new(config: &ClientConfig) -> AppResult<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.server_url)
            .map_err(|e| AppError::Config(format!("Invalid server URL {}: {}", config.server_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| AppError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_download_size: config.max_download_size,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a locator; bare names resolve to the upload area.
    fn resolve(&self, locator: &str) -> Result<Url, PipelineError> {
        if let Ok(url) = Url::parse(locator) {
            return Ok(url);
        }

        let path = if locator.starts_with('/') {
            locator.to_string()
        } else {
            format!("/image/{}", locator)
        };

        self.base_url
            .join(&path)
            .map_err(|e| PipelineError::Acquire(format!("Invalid locator {}: {}", locator, e)))
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorResponse>().await {
            Ok(body) => format!("HTTP {}: {}", status, body.error),
            Err(_) => format!("HTTP {}", status),
        }
    }
}

impl RemoteStore for HttpStoreClient {
    async fn list_available(&self) -> Result<Vec<BlobEntry>, PipelineError> {
        let url = self
            .base_url
            .join("/images")
            .map_err(|e| PipelineError::Acquire(e.to_string()))?;

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            error_logging::log_network_error(&e, "list_images", Some(url.as_str()), None);
            PipelineError::Acquire(format!("Store unreachable: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::Acquire(Self::error_message(response).await));
        }

        let entries: Vec<BlobEntry> = response
            .json()
            .await
            .map_err(|e| PipelineError::Acquire(format!("Malformed image listing: {}", e)))?;

        debug!(count = entries.len(), "Listed remote images");
        Ok(entries)
    }

    async fn fetch(&self, locator: &str) -> Result<FetchedBlob, PipelineError> {
        let url = self.resolve(locator)?;
        let start = Instant::now();

        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            error_logging::log_network_error(&e, "fetch_blob", Some(url.as_str()), None);
            PipelineError::Acquire(format!("Store unreachable: {}", e))
        })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(PipelineError::Acquire(format!("No image at {}", url)));
            }
            _ => return Err(PipelineError::Acquire(Self::error_message(response).await)),
        }

        // Check Content-Length header to prevent downloading oversized files
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_download_size {
                return Err(PipelineError::Acquire(format!(
                    "File too large: {} bytes (maximum allowed: {} bytes)",
                    content_length, self.max_download_size
                )));
            }
        }

        let mut file = NamedTempFile::new()
            .map_err(|e| PipelineError::Acquire(format!("Cannot create temporary file: {}", e)))?;
        let mut size: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PipelineError::Acquire(format!("Download interrupted: {}", e)))?
        {
            size += chunk.len() as u64;
            if size > self.max_download_size {
                return Err(PipelineError::Acquire(format!(
                    "File too large: more than {} bytes",
                    self.max_download_size
                )));
            }
            file.write_all(&chunk)
                .map_err(|e| PipelineError::Acquire(format!("Cannot buffer download: {}", e)))?;
        }

        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(secure_filename)
            .unwrap_or_else(|| "unnamed_file".to_string());

        observability::record_transfer_metrics("download", size, start.elapsed());
        debug!(url = %url, size, temp_path = %file.path().display(), "Blob downloaded");

        Ok(FetchedBlob { name, size, file })
    }

    async fn deposit(&self, name: &str, bytes: Vec<u8>) -> Result<Deposit, PipelineError> {
        let url = self
            .base_url
            .join("/save_processed")
            .map_err(|e| PipelineError::Deposit(e.to_string()))?;
        let size = bytes.len() as u64;
        let start = Instant::now();

        let part = Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(content_type_for(name))
            .map_err(|e| PipelineError::Deposit(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error_logging::log_network_error(&e, "deposit_blob", Some(url.as_str()), None);
                PipelineError::Deposit(format!("Store unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::Deposit(Self::error_message(response).await));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Deposit(format!("Malformed store response: {}", e)))?;

        let locator = self
            .base_url
            .join(&body.url)
            .map(|url| url.to_string())
            .unwrap_or(body.url);

        observability::record_transfer_metrics("upload", size, start.elapsed());
        info!(filename = %body.filename, locator = %locator, "Processed image deposited");

        Ok(Deposit {
            name: body.filename,
            locator,
        })
    }
}
