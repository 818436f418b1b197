//! # Pipeline Error Types Module
//!
//! Error taxonomy for a single fetch, segment and store run. Every stage maps
//! its failures into one of these kinds and the run aborts on the first one.

use crate::segmentation::SegmentationError;

/// Errors raised by an orchestration run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Source blob missing or unreachable
    Acquire(String),
    /// Bytes are not a decodable image
    Decode(String),
    /// Empty or constant-intensity grid
    DegenerateInput(String),
    /// Binary grid could not be encoded
    Encode(String),
    /// Store rejected the blob or the local write failed
    Deposit(String),
    /// A worker task died before finishing its stage
    Internal(String),
}

impl PipelineError {
    /// Short machine-readable kind, used for metrics labels and user reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Acquire(_) => "acquire",
            PipelineError::Decode(_) => "decode",
            PipelineError::DegenerateInput(_) => "degenerate_input",
            PipelineError::Encode(_) => "encode",
            PipelineError::Deposit(_) => "deposit",
            PipelineError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Acquire(msg) => write!(f, "[ACQUIRE] Failed to acquire source image: {}", msg),
            PipelineError::Decode(msg) => write!(f, "[DECODE] Source bytes are not a valid image: {}", msg),
            PipelineError::DegenerateInput(msg) => write!(f, "[DEGENERATE_INPUT] {}", msg),
            PipelineError::Encode(msg) => write!(f, "[ENCODE] Failed to encode binary image: {}", msg),
            PipelineError::Deposit(msg) => write!(f, "[DEPOSIT] Failed to store processed image: {}", msg),
            PipelineError::Internal(msg) => write!(f, "[INTERNAL] Pipeline worker failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<SegmentationError> for PipelineError {
    fn from(err: SegmentationError) -> Self {
        PipelineError::DegenerateInput(err.to_string())
    }
}

impl From<crate::codec::CodecError> for PipelineError {
    fn from(err: crate::codec::CodecError) -> Self {
        match err {
            crate::codec::CodecError::Decode(msg) => PipelineError::Decode(msg),
            crate::codec::CodecError::Encode(msg) => PipelineError::Encode(msg),
        }
    }
}
