//! # Shared Types for Segmentation
//!
//! This module contains the histogram, result and error types used across
//! the segmentation sub-modules.

use image::GrayImage;

/// Number of intensity levels in an 8-bit grid.
pub const INTENSITY_LEVELS: usize = 256;

/// Errors that can occur while selecting a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    /// The grid has no pixels, or every pixel shares one intensity level
    EmptyOrDegenerateInput {
        total_pixels: u64,
        occupied_levels: usize,
    },
}

impl std::fmt::Display for SegmentationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentationError::EmptyOrDegenerateInput {
                total_pixels,
                occupied_levels,
            } => {
                if *total_pixels == 0 {
                    write!(f, "Cannot select a threshold for an empty image")
                } else {
                    write!(
                        f,
                        "Cannot select a threshold: {} pixels span only {} intensity level(s)",
                        total_pixels, occupied_levels
                    )
                }
            }
        }
    }
}

impl std::error::Error for SegmentationError {}

/// 256-bin count of pixel intensities.
///
/// Index is the intensity level, value is the number of pixels at that level.
/// The sum of all bins always equals the pixel count of the source grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: [u64; INTENSITY_LEVELS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            bins: [0; INTENSITY_LEVELS],
        }
    }
}

impl Histogram {
    /// Wrap pre-computed bin counts.
    pub fn from_bins(bins: [u64; INTENSITY_LEVELS]) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u64; INTENSITY_LEVELS] {
        &self.bins
    }

    pub fn count(&self, level: u8) -> u64 {
        self.bins[level as usize]
    }

    /// Total number of pixels counted.
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }

    /// Number of intensity levels with at least one pixel.
    pub fn occupied_levels(&self) -> usize {
        self.bins.iter().filter(|&&count| count > 0).count()
    }

    pub(crate) fn increment(&mut self, level: u8) {
        self.bins[level as usize] += 1;
    }
}

/// Result of a full segmentation pass over one image.
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    /// The binary image (every sample is 0 or 255)
    pub image: GrayImage,
    /// Threshold selected by Otsu's method
    pub threshold: u8,
    /// Fraction of pixels mapped to 255
    pub foreground_ratio: f64,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

impl SegmentationResult {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
