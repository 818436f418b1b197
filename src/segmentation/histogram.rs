//! # Histogram Builder
//!
//! Single pass over a grayscale grid producing exact per-level counts.

use image::GrayImage;

use super::types::Histogram;

/// Count the pixels at each of the 256 intensity levels.
///
/// An empty image yields an all-zero histogram; the threshold selector
/// rejects it.
pub fn build_histogram(gray: &GrayImage) -> Histogram {
    let mut histogram = Histogram::default();

    for &intensity in gray.as_raw() {
        histogram.increment(intensity);
    }

    histogram
}
