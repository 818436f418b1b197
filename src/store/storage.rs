//! Filesystem-backed blob storage.
//!
//! Both storage areas come from an explicit [`StoreConfig`]. Writes go to a
//! temporary file in the target directory and are renamed into place, so a
//! reader never sees a half-written blob and concurrent deposits under the
//! same name are last-writer-wins.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::errors::error_logging;
use crate::path_validation::{
    extension_of, has_allowed_extension, processed_name, secure_filename, validate_blob_name,
    PathValidationError,
};

/// Which of the two storage areas a blob lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreArea {
    Uploads,
    Processed,
}

impl StoreArea {
    /// URL prefix under which the area is served
    pub fn url_prefix(self) -> &'static str {
        match self {
            StoreArea::Uploads => "/static/uploads",
            StoreArea::Processed => "/static/processed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StoreArea::Uploads => "uploads",
            StoreArea::Processed => "processed",
        }
    }
}

/// A blob written to or listed from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// Errors raised by blob storage
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Name is unsafe or has a disallowed extension
    InvalidName(PathValidationError),
    /// No blob with that name
    NotFound(String),
    /// Underlying filesystem failure
    Io(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::InvalidName(err) => write!(f, "Invalid blob name: {}", err),
            StorageError::NotFound(name) => write!(f, "Blob not found: {}", name),
            StorageError::Io(msg) => write!(f, "Storage I/O error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<PathValidationError> for StorageError {
    fn from(err: PathValidationError) -> Self {
        StorageError::InvalidName(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

/// Blob storage rooted in the directories of a [`StoreConfig`]
#[derive(Debug, Clone)]
pub struct BlobStorage {
    config: StoreConfig,
}

impl BlobStorage {
    /// Create storage, creating both directories if absent.
    pub fn new(config: StoreConfig) -> Result<Self, StorageError> {
        for dir in [&config.upload_dir, &config.processed_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                error_logging::log_filesystem_error(
                    &e,
                    "create_storage_dir",
                    Some(&dir.display().to_string()),
                    None,
                );
                StorageError::from(e)
            })?;
        }

        info!(
            upload_dir = %config.upload_dir.display(),
            processed_dir = %config.processed_dir.display(),
            "Blob storage ready"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn dir(&self, area: StoreArea) -> &Path {
        match area {
            StoreArea::Uploads => &self.config.upload_dir,
            StoreArea::Processed => &self.config.processed_dir,
        }
    }

    /// Public URL path of a blob
    pub fn url_for(area: StoreArea, name: &str) -> String {
        format!("{}/{}", area.url_prefix(), name)
    }

    fn check_extension(&self, name: &str) -> Result<(), StorageError> {
        if has_allowed_extension(name, &self.config.allowed_extensions) {
            Ok(())
        } else {
            Err(StorageError::InvalidName(PathValidationError::DisallowedExtension(
                extension_of(name).unwrap_or_default(),
            )))
        }
    }

    /// Store an uploaded source image as `<uuid>_<sanitized name>`.
    pub async fn save_upload(
        &self,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, StorageError> {
        let safe = secure_filename(original_name);
        self.check_extension(&safe)?;

        let name = format!("{}_{}", Uuid::new_v4().simple(), safe);
        self.write(StoreArea::Uploads, name, bytes).await
    }

    /// Store a processed image under its processed name.
    pub async fn save_processed(
        &self,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, StorageError> {
        let safe = secure_filename(original_name);
        self.check_extension(&safe)?;

        self.write(StoreArea::Processed, processed_name(&safe), bytes).await
    }

    async fn write(
        &self,
        area: StoreArea,
        name: String,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, StorageError> {
        let dir = self.dir(area).to_path_buf();
        let size = bytes.len() as u64;

        let target = {
            let name = name.clone();
            tokio::task::spawn_blocking(move || write_atomically(&dir, &name, &bytes))
                .await
                .map_err(|e| StorageError::Io(format!("Write task failed: {}", e)))??
        };

        debug!(area = area.label(), path = %target.display(), size, "Blob stored");
        crate::observability::record_blob_stored(area.label(), size);

        Ok(StoredBlob {
            url: Self::url_for(area, &name),
            name,
            size,
        })
    }

    /// Read a blob by name.
    pub async fn read(&self, area: StoreArea, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_blob_name(name)?;
        let path = self.dir(area).join(name);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List blobs with an allowed extension, sorted by name.
    pub async fn list(&self, area: StoreArea) -> Result<Vec<StoredBlob>, StorageError> {
        let mut entries = tokio::fs::read_dir(self.dir(area)).await?;
        let mut blobs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !has_allowed_extension(&name, &self.config.allowed_extensions) {
                continue;
            }
            blobs.push(StoredBlob {
                url: Self::url_for(area, &name),
                name,
                size: metadata.len(),
            });
        }

        blobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(blobs)
    }
}

fn write_atomically(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    let target = dir.join(name);
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.persist(&target).map_err(|e| StorageError::Io(e.error.to_string()))?;
    Ok(target)
}

/// MIME type for a stored blob, from its extension
pub fn content_type_for(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
