//! # Blob Store
//!
//! Named-blob storage for source and processed images, and the HTTP server
//! that exposes it. The JSON bodies exchanged with clients live here so both
//! sides agree on the wire format.

pub mod server;
pub mod storage;

use serde::{Deserialize, Serialize};

pub use server::spawn_store_server;
pub use storage::{BlobStorage, StorageError, StoreArea, StoredBlob};

/// One entry of the `GET /images` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub name: String,
    pub url: String,
}

/// Body returned by the upload and save routes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub url: String,
    /// Only set by server-side processing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
}

/// Body returned on any rejected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
