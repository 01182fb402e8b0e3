//! Re-encode captured and picked images to a bounded JPEG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;

/// Longest edge of a normalized photo, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 1920;

/// JPEG quality of a normalized photo.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Errors that can occur while normalizing an image.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Image is empty")]
    Empty,

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

/// Turns raw image bytes into a bounded JPEG.
///
/// Captured and gallery photos go through the same normalizer so uploads are
/// uniform in size and format.
pub trait ImageNormalizer: Send + Sync {
    fn normalize(&self, raw: &[u8]) -> Result<Vec<u8>, NormalizeError>;
}

/// Normalizer backed by the `image` crate.
#[derive(Debug, Clone, Copy)]
pub struct JpegNormalizer {
    max_dimension: u32,
    quality: u8,
}

impl Default for JpegNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION, DEFAULT_JPEG_QUALITY)
    }
}

impl JpegNormalizer {
    /// `quality` is clamped to 1..=100 and `max_dimension` to at least 1.
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl ImageNormalizer for JpegNormalizer {
    fn normalize(&self, raw: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        if raw.is_empty() {
            return Err(NormalizeError::Empty);
        }

        let mut img = image::load_from_memory(raw).map_err(NormalizeError::Decode)?;
        let (width, height) = img.dimensions();
        if width > self.max_dimension || height > self.max_dimension {
            // resize() keeps the aspect ratio and fits inside the box
            img = img.resize(self.max_dimension, self.max_dimension, FilterType::Triangle);
            log::debug!(
                "Resized photo from {}x{} to {}x{}",
                width,
                height,
                img.width(),
                img.height()
            );
        }

        let rgb = img.to_rgb8();
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&rgb)
            .map_err(NormalizeError::Encode)?;
        Ok(out.into_inner())
    }
}
