//! # Image Segmentation Module
//!
//! Global-threshold binarization of decoded images.
//!
//! The module is organized into focused sub-modules:
//! - `grayscale`: BT.601 luminance reduction of colour grids
//! - `histogram`: 256-bin intensity histogram
//! - `thresholding`: Otsu threshold selection and binarization
//! - `types`: Shared types and error definitions

pub mod grayscale;
pub mod histogram;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{Histogram, SegmentationError, SegmentationResult, INTENSITY_LEVELS};

pub use grayscale::to_grayscale;
pub use histogram::build_histogram;
pub use thresholding::{binarize, compute_threshold, segment_image, select_otsu_threshold};
