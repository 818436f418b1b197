//! # Luminance Reduction
//!
//! Colour grids are reduced to one channel with ITU-R BT.601 luma weights
//! (0.299, 0.587, 0.114) in 14-bit fixed point, rounding to nearest.
//! Gray inputs pass through unchanged and luma+alpha inputs drop alpha.

use image::{DynamicImage, GrayImage, Luma};

const WEIGHT_R: u32 = 4899;
const WEIGHT_G: u32 = 9617;
const WEIGHT_B: u32 = 1868;
const FIXED_POINT_SHIFT: u32 = 14;
const ROUNDING: u32 = 1 << (FIXED_POINT_SHIFT - 1);

/// BT.601 luma of one RGB sample.
#[inline]
pub fn bt601_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (WEIGHT_R * r as u32 + WEIGHT_G * g as u32 + WEIGHT_B * b as u32 + ROUNDING)
        >> FIXED_POINT_SHIFT;
    y.min(255) as u8
}

/// Reduce a decoded image to an 8-bit grayscale grid.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            image.to_luma8()
        }
        _ => {
            let rgb = image.to_rgb8();
            let (width, height) = rgb.dimensions();
            let mut gray = GrayImage::new(width, height);

            for (src, dst) in rgb.pixels().zip(gray.pixels_mut()) {
                *dst = Luma([bt601_luma(src[0], src[1], src[2])]);
            }

            gray
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_bt601_extremes() {
        assert_eq!(bt601_luma(0, 0, 0), 0);
        assert_eq!(bt601_luma(255, 255, 255), 255);
    }

    #[test]
    fn test_bt601_primaries() {
        // 0.299 * 255 = 76.2, 0.587 * 255 = 149.7, 0.114 * 255 = 29.1
        assert_eq!(bt601_luma(255, 0, 0), 76);
        assert_eq!(bt601_luma(0, 255, 0), 150);
        assert_eq!(bt601_luma(0, 0, 255), 29);
    }

    #[test]
    fn test_gray_input_passes_through() {
        let gray = GrayImage::from_raw(2, 2, vec![1, 2, 3, 4]).expect("valid raw buffer");
        let reduced = to_grayscale(&DynamicImage::ImageLuma8(gray.clone()));
        assert_eq!(reduced, gray);
    }

    #[test]
    fn test_colour_input_keeps_dimensions() {
        let rgb = RgbImage::from_pixel(5, 3, Rgb([10, 20, 30]));
        let reduced = to_grayscale(&DynamicImage::ImageRgb8(rgb));

        assert_eq!(reduced.dimensions(), (5, 3));
        let expected = bt601_luma(10, 20, 30);
        assert!(reduced.pixels().all(|p| p[0] == expected));
    }
}
