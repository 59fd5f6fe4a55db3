//! Frame Preprocessing
//!
//! Deterministic pipeline run on every sampled frame before dispatch:
//! resize to the canonical detection resolution, smooth out sensor noise,
//! compress to JPEG. The same pixel buffer and quality always produce
//! identical output bytes.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{EncodedFrame, RawFrame};

/// Canonical resolution frames are normalized to before detection.
pub const CANONICAL_WIDTH: u32 = 1280;
pub const CANONICAL_HEIGHT: u32 = 720;

/// Default JPEG quality (0-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Gaussian sigma for noise smoothing, roughly a 5x5 kernel.
const DENOISE_SIGMA: f32 = 1.2;

/// Normalizes and compresses sampled frames.
pub struct FramePreprocessor {
    quality: u8,
}

impl FramePreprocessor {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Resize, denoise, and JPEG-encode one frame.
    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame> {
        let pixels = &frame.pixels;
        let img = RgbImage::from_raw(pixels.width, pixels.height, pixels.data.clone())
            .ok_or_else(|| {
                Error::Encoding(format!(
                    "frame {}: pixel buffer does not match {}x{} RGB8",
                    frame.index, pixels.width, pixels.height
                ))
            })?;

        let resized = DynamicImage::ImageRgb8(img)
            .resize_exact(CANONICAL_WIDTH, CANONICAL_HEIGHT, FilterType::Triangle)
            .to_rgb8();
        let smoothed = image::imageops::blur(&resized, DENOISE_SIGMA);

        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
        smoothed.write_with_encoder(encoder).map_err(|e| {
            Error::Encoding(format!("frame {}: jpeg encode failed: {e}", frame.index))
        })?;

        Ok(EncodedFrame {
            index: frame.index,
            timestamp: frame.timestamp,
            bytes,
            mime_type: "image/jpeg",
        })
    }

    /// Encodes a batch in order. A single frame's failure is logged and the
    /// frame dropped; it never aborts the rest of the batch.
    pub fn encode_all(&self, frames: impl IntoIterator<Item = RawFrame>) -> Vec<EncodedFrame> {
        frames
            .into_iter()
            .filter_map(|frame| match self.encode(&frame) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    warn!("dropping frame {}: {}", frame.index, e);
                    None
                }
            })
            .collect()
    }
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}
