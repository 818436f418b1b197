//! # Segmentation Tests
//!
//! Properties of the histogram, Otsu selector and binarizer on synthetic grids.

mod test_helpers;

use image::{DynamicImage, GrayImage, Luma};
use otsu_relay::segmentation::{
    binarize, build_histogram, compute_threshold, segment_image, select_otsu_threshold, Histogram,
    SegmentationError,
};
use test_helpers::{color_scene, half_black_grid, two_cluster_grid};

#[test]
fn test_histogram_sums_to_pixel_count() {
    for (width, height) in [(1, 1), (3, 7), (32, 32), (100, 1)] {
        let grid = GrayImage::from_fn(width, height, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));
        let histogram = build_histogram(&grid);

        assert_eq!(histogram.total(), u64::from(width) * u64::from(height));
        assert_eq!(histogram.bins().iter().sum::<u64>(), histogram.total());
    }
}

#[test]
fn test_binarize_is_idempotent_on_binary_grids() {
    let binary = half_black_grid();

    for threshold in [1u8, 64, 128, 200, 254] {
        assert_eq!(binarize(&binary, threshold), binary, "threshold {}", threshold);
    }
}

#[test]
fn test_two_clusters_threshold_strictly_between() {
    let grid = two_cluster_grid();
    let threshold = compute_threshold(&grid).expect("bimodal grid has a threshold");

    // Clusters occupy 38..=42 and 198..=202
    assert!(threshold >= 42 && threshold < 198, "threshold {}", threshold);

    let binary = binarize(&grid, threshold);
    assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    assert_eq!(binary.get_pixel(0, 0)[0], 0);
    assert_eq!(binary.get_pixel(31, 0)[0], 255);
}

#[test]
fn test_two_pure_values_pick_the_lower_one() {
    // Every cut between 10 and 200 separates the classes equally well
    let grid = GrayImage::from_fn(10, 10, |x, _| if x % 2 == 0 { Luma([10]) } else { Luma([200]) });

    assert_eq!(compute_threshold(&grid).expect("threshold"), 10);
}

#[test]
fn test_constant_grid_is_degenerate() {
    let grid = GrayImage::from_pixel(8, 8, Luma([128]));

    match compute_threshold(&grid) {
        Err(SegmentationError::EmptyOrDegenerateInput {
            total_pixels,
            occupied_levels,
        }) => {
            assert_eq!(total_pixels, 64);
            assert_eq!(occupied_levels, 1);
        }
        other => panic!("expected degenerate input, got {:?}", other),
    }
}

#[test]
fn test_empty_histogram_is_degenerate() {
    let result = select_otsu_threshold(&Histogram::default());
    assert!(matches!(
        result,
        Err(SegmentationError::EmptyOrDegenerateInput { total_pixels: 0, .. })
    ));
}

#[test]
fn test_tie_break_returns_smaller_threshold() {
    // Every cut from 50 to 149 splits this histogram identically
    let mut bins = [0u64; 256];
    bins[50] = 10;
    bins[150] = 10;
    let histogram = Histogram::from_bins(bins);

    assert_eq!(select_otsu_threshold(&histogram).expect("threshold"), 50);
}

#[test]
fn test_segment_color_image() {
    let image = DynamicImage::ImageRgb8(color_scene());
    let result = segment_image(&image).expect("colour scene segments");

    assert_eq!(result.dimensions(), (16, 16));
    // Yellow square is foreground, dark red background is not
    assert_eq!(result.image.get_pixel(8, 8)[0], 255);
    assert_eq!(result.image.get_pixel(0, 0)[0], 0);
    assert!((result.foreground_ratio - 0.25).abs() < 1e-9);
}

fn symmetric_tie_histogram(scale: u64) -> Histogram {
    let mut bins = [0u64; 256];
    for (level, count) in [
        (113, 3),
        (115, 5),
        (123, 3),
        (144, 7),
        (148, 7),
        (169, 3),
        (177, 5),
        (179, 3),
    ] {
        bins[level] = count * scale;
    }
    Histogram::from_bins(bins)
}

#[test]
fn test_tie_between_distant_thresholds_returns_smaller() {
    // Splits at 123 and 148 have exactly equal between-class variance, while
    // the floating-point sums along the way differ in their last bits
    assert_eq!(select_otsu_threshold(&symmetric_tie_histogram(1)).expect("threshold"), 123);
}

#[test]
fn test_tie_break_holds_for_large_pixel_counts() {
    assert_eq!(
        select_otsu_threshold(&symmetric_tie_histogram(1_000_000)).expect("threshold"),
        123
    );
}
