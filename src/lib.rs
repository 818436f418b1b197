//! # Otsu Relay
//!
//! Global-threshold (Otsu) binarization of images moved between a small HTTP
//! blob store and the local filesystem. The library holds the segmentation
//! core, the store server and the client orchestrator; the `otsu-relay` and
//! `otsu-client` binaries wire them to configuration and observability.

pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod observability;
pub mod observability_config;
pub mod path_validation;
pub mod pipeline_errors;
pub mod segmentation;
pub mod store;

// Re-export types for easier access
pub use client::{OrchestrationMode, Orchestrator, RunOutcome};
pub use pipeline_errors::PipelineError;
pub use segmentation::{binarize, compute_threshold, segment_image, SegmentationError};
