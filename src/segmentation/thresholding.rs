//! # Otsu Thresholding
//!
//! Global threshold selection by Otsu's method and the binarizer that applies it.
//!
//! For every candidate `t` in `0..=255` the intensities split into class A
//! (`<= t`) and class B (`> t`). The selected threshold maximizes the
//! between-class variance `w_a * w_b * (mu_a - mu_b)^2`. When several
//! candidates reach the maximum the smallest one wins.

use image::{DynamicImage, GrayImage, Luma};

use super::grayscale::to_grayscale;
use super::histogram::build_histogram;
use super::types::{Histogram, SegmentationError, SegmentationResult, INTENSITY_LEVELS};

/// Value written for pixels above the threshold.
pub const FOREGROUND: u8 = 255;
/// Value written for pixels at or below the threshold.
pub const BACKGROUND: u8 = 0;

/// Reduces, thresholds and binarizes an image in one pass.
///
/// # Examples
///
/// ```no_run
/// use otsu_relay::segmentation::segment_image;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let img = image::open("scan.png")?;
/// let result = segment_image(&img)?;
/// println!("Optimal threshold: {}", result.threshold);
/// # Ok(())
/// # }
/// ```
pub fn segment_image(image: &DynamicImage) -> Result<SegmentationResult, SegmentationError> {
    let start_time = std::time::Instant::now();

    let gray = to_grayscale(image);
    let histogram = build_histogram(&gray);
    let threshold = select_otsu_threshold(&histogram)?;
    let binary = binarize(&gray, threshold);

    let total = histogram.total();
    let foreground: u64 = histogram.bins()[threshold as usize + 1..].iter().sum();
    let foreground_ratio = foreground as f64 / total as f64;

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "segmentation",
        "Otsu thresholding completed in {}ms: threshold={}, dimensions={}x{}",
        processing_time.as_millis(),
        threshold,
        gray.width(),
        gray.height()
    );

    Ok(SegmentationResult {
        image: binary,
        threshold,
        foreground_ratio,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Selects the Otsu threshold of a single-channel grid.
pub fn compute_threshold(gray: &GrayImage) -> Result<u8, SegmentationError> {
    select_otsu_threshold(&build_histogram(gray))
}

/// Largest pixel count for which split scores are compared exactly in integers.
const EXACT_PIXEL_LIMIT: u64 = u32::MAX as u64;

/// Between-class variance of one split, scaled by `N^2` and kept as the
/// fraction `diff^2 / weight` where `diff = S_a * n_b - S_b * n_a` and
/// `weight = n_a * n_b`.
#[derive(Debug, Clone, Copy)]
struct SplitScore {
    diff: u128,
    weight: u128,
    variance: f64,
}

impl SplitScore {
    fn new(n_a: u128, s_a: u128, n_b: u128, s_b: u128, total: u128, exact: bool) -> Self {
        let (w_a, w_b) = (n_a as f64 / total as f64, n_b as f64 / total as f64);
        let mean_gap = s_a as f64 / n_a as f64 - s_b as f64 / n_b as f64;
        let variance = w_a * w_b * mean_gap * mean_gap;

        let (diff, weight) = if exact {
            ((s_a * n_b).abs_diff(s_b * n_a), n_a * n_b)
        } else {
            (0, 0)
        };

        Self {
            diff,
            weight,
            variance,
        }
    }

    /// `self > other`, compared as `diff1^2 * weight2 > diff2^2 * weight1`.
    fn exceeds(&self, other: &SplitScore, exact: bool) -> bool {
        if exact {
            scaled_square(self.diff, other.weight) > scaled_square(other.diff, self.weight)
        } else {
            self.variance > other.variance
        }
    }
}

/// Full 256-bit product of two `u128` values as `(high, low)`.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let low = a_lo * b_lo;
    let cross_a = a_lo * b_hi;
    let cross_b = a_hi * b_lo;
    let high = a_hi * b_hi;

    let middle = (low >> 64) + (cross_a & MASK) + (cross_b & MASK);
    let lo = (low & MASK) | (middle << 64);
    let hi = high + (cross_a >> 64) + (cross_b >> 64) + (middle >> 64);
    (hi, lo)
}

/// `value^2 * factor` as a 256-bit `(high, low)` pair.
///
/// Requires `value < 2^72` and `factor < 2^64`, which holds for histograms
/// of at most [`EXACT_PIXEL_LIMIT`] pixels.
fn scaled_square(value: u128, factor: u128) -> (u128, u128) {
    let (square_hi, square_lo) = mul_wide(value, value);
    let (carry, lo) = mul_wide(square_lo, factor);
    (square_hi * factor + carry, lo)
}

/// Finds the threshold that maximizes between-class variance.
///
/// Fails with [`SegmentationError::EmptyOrDegenerateInput`] when the histogram
/// is empty or holds a single occupied level, since no split separates
/// anything there. Scores are compared in exact integer arithmetic so that
/// equal variances always resolve to the smaller threshold; histograms above
/// [`EXACT_PIXEL_LIMIT`] pixels fall back to `f64`.
pub fn select_otsu_threshold(histogram: &Histogram) -> Result<u8, SegmentationError> {
    let total_pixels = histogram.total();
    let occupied_levels = histogram.occupied_levels();

    if total_pixels == 0 || occupied_levels < 2 {
        return Err(SegmentationError::EmptyOrDegenerateInput {
            total_pixels,
            occupied_levels,
        });
    }

    let exact = total_pixels <= EXACT_PIXEL_LIMIT;
    let bins = histogram.bins();
    let total = u128::from(total_pixels);
    let total_weighted_sum: u128 = bins
        .iter()
        .enumerate()
        .map(|(level, &count)| level as u128 * u128::from(count))
        .sum();

    let mut class_a_count = 0u128;
    let mut class_a_weighted_sum = 0u128;
    let mut best: Option<(u8, SplitScore)> = None;

    for level in 0..INTENSITY_LEVELS {
        let count = u128::from(bins[level]);
        class_a_count += count;
        class_a_weighted_sum += level as u128 * count;

        let class_b_count = total - class_a_count;
        if class_a_count == 0 || class_b_count == 0 {
            continue;
        }

        let score = SplitScore::new(
            class_a_count,
            class_a_weighted_sum,
            class_b_count,
            total_weighted_sum - class_a_weighted_sum,
            total,
            exact,
        );

        // Strict comparison keeps the first maximum.
        match best {
            Some((_, best_score)) if !score.exceeds(&best_score, exact) => {}
            _ => best = Some((level as u8, score)),
        }
    }

    if let Some((threshold, score)) = best {
        tracing::trace!(threshold, variance = score.variance, "Otsu split selected");
    }

    // At least two occupied levels guarantee one split with both classes populated.
    best.map(|(threshold, _)| threshold)
        .ok_or(SegmentationError::EmptyOrDegenerateInput {
            total_pixels,
            occupied_levels,
        })
}

/// Maps every sample to 255 if it is above `threshold`, else 0.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut binary = GrayImage::new(width, height);

    for (src, dst) in gray.pixels().zip(binary.pixels_mut()) {
        let value = if src[0] > threshold {
            FOREGROUND
        } else {
            BACKGROUND
        };
        *dst = Luma([value]);
    }

    debug_assert_eq!(binary.dimensions(), gray.dimensions());
    binary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram_with(levels: &[(u8, u64)]) -> Histogram {
        let mut bins = [0u64; INTENSITY_LEVELS];
        for &(level, count) in levels {
            bins[level as usize] = count;
        }
        Histogram::from_bins(bins)
    }

    #[test]
    fn test_segment_image_two_regions() {
        // Left half dark, right half light
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([25]) } else { Luma([225]) });

        let result = segment_image(&DynamicImage::ImageLuma8(img))
            .expect("segment_image should succeed with a two-tone image");

        assert!((25..225).contains(&result.threshold));
        for (x, _, pixel) in result.image.enumerate_pixels() {
            let expected = if x < 5 { BACKGROUND } else { FOREGROUND };
            assert_eq!(pixel[0], expected);
        }
        assert!((result.foreground_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_constant_image_is_degenerate() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));

        let err = compute_threshold(&img).expect_err("constant image must be rejected");

        assert_eq!(
            err,
            SegmentationError::EmptyOrDegenerateInput {
                total_pixels: 100,
                occupied_levels: 1
            }
        );
    }

    #[test]
    fn test_empty_histogram_is_degenerate() {
        let err = select_otsu_threshold(&Histogram::default())
            .expect_err("empty histogram must be rejected");

        assert!(matches!(
            err,
            SegmentationError::EmptyOrDegenerateInput { total_pixels: 0, .. }
        ));
    }

    #[test]
    fn test_tie_break_prefers_smallest_threshold() {
        // Thresholds 10 and 11 give identical classes, hence identical variance
        let histogram = histogram_with(&[(10, 50), (12, 50)]);

        let threshold = select_otsu_threshold(&histogram).expect("valid histogram");

        assert_eq!(threshold, 10);
    }

    #[test]
    fn test_mul_wide_matches_known_products() {
        assert_eq!(mul_wide(u128::MAX, 2), (1, u128::MAX - 1));
        assert_eq!(mul_wide(1 << 64, 1 << 64), (1, 0));
        assert_eq!(mul_wide(12345, 678), (0, 12345 * 678));
    }

    #[test]
    fn test_scaled_square_orders_large_scores() {
        let big = 1u128 << 70;
        assert!(scaled_square(big, 3) > scaled_square(big, 2));
        assert!(scaled_square(big + 1, 2) > scaled_square(big, 2));
        assert_eq!(scaled_square(3, 5), (0, 45));
    }

    #[test]
    fn test_spread_clusters_threshold_between_modes() {
        let histogram = histogram_with(&[
            (8, 100),
            (10, 300),
            (12, 100),
            (198, 100),
            (200, 300),
            (202, 100),
        ]);

        let threshold = select_otsu_threshold(&histogram).expect("valid histogram");

        assert!(threshold > 10 && threshold < 200);
        assert_eq!(threshold, 12);
    }

    #[test]
    fn test_unbalanced_classes_follow_variance() {
        // Three levels: the split that isolates the distant level wins
        let histogram = histogram_with(&[(0, 100), (10, 100), (250, 100)]);

        let threshold = select_otsu_threshold(&histogram).expect("valid histogram");

        assert_eq!(threshold, 10);
    }

    #[test]
    fn test_binarize_partition_convention() {
        let gray = GrayImage::from_raw(4, 1, vec![99, 100, 101, 255]).expect("valid raw buffer");

        let binary = binarize(&gray, 100);

        assert_eq!(binary.as_raw(), &vec![0, 0, 255, 255]);
    }
}
