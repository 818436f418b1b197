//! # Image Codec
//!
//! Decoding of stored bytes into pixel grids and encoding of binary grids
//! back into file bytes. The output container is chosen from the target
//! file name so that a processed blob keeps its original extension.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, ImageReader};

/// Errors raised by the codec
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Bytes could not be decoded into an image
    Decode(String),
    /// Grid could not be encoded
    Encode(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Decode(msg) => write!(f, "Failed to decode image: {}", msg),
            CodecError::Encode(msg) => write!(f, "Failed to encode image: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Decode in-memory bytes, guessing the format from the content.
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CodecError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| CodecError::Decode(e.to_string()))
}

/// Decode an image file, guessing the format from the content.
pub fn decode_file(path: &Path) -> Result<DynamicImage, CodecError> {
    ImageReader::open(path)
        .map_err(|e| CodecError::Decode(format!("{}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| CodecError::Decode(format!("{}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| CodecError::Decode(format!("{}: {}", path.display(), e)))
}

/// Container format implied by a file name. Unknown extensions encode as PNG.
pub fn output_format_for(name: &str) -> ImageFormat {
    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
        Some("gif") => ImageFormat::Gif,
        _ => ImageFormat::Png,
    }
}

/// Encode a grayscale grid in the container implied by `name`.
///
/// PNG and GIF store a binary grid exactly. JPEG is lossy: a `.jpg` output
/// decodes to values near, but not only at, 0 and 255.
pub fn encode_gray(gray: &GrayImage, name: &str) -> Result<Vec<u8>, CodecError> {
    let format = output_format_for(name);

    // The GIF encoder only accepts RGB(A) input
    let image = match format {
        ImageFormat::Gif => DynamicImage::ImageRgba8(DynamicImage::ImageLuma8(gray.clone()).to_rgba8()),
        _ => DynamicImage::ImageLuma8(gray.clone()),
    };

    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    Ok(buffer)
}
