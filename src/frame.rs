//! Frame containers.
//!
//! - `RawFrame`: one captured RGB8 image. Each camera holds exactly one current
//!   frame; it is overwritten on every read, never queued.
//! - `EncodedFrame`: the JPEG that the broadcast engine hands out, shared as
//!   `Arc<EncodedFrame>`.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::time::Instant;

/// JPEG quality used for snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 90;

pub struct RawFrame {
    pub image: RgbImage,
    pub seq: u64,
    pub captured_at: Instant,
}

impl RawFrame {
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self {
            image,
            seq,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub seq: u64,
    pub jpeg: Vec<u8>,
    pub captured_at: Instant,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Downscales by `scale` and mirrors horizontally when `mirror` is set.
pub fn prepare_stream_image(image: &RgbImage, scale: f32, mirror: bool) -> RgbImage {
    let scaled = if (scale - 1.0).abs() < f32::EPSILON {
        image.clone()
    } else {
        let width = ((image.width() as f32 * scale).round() as u32).max(1);
        let height = ((image.height() as f32 * scale).round() as u32).max(1);
        imageops::resize(image, width, height, FilterType::Triangle)
    };
    if mirror {
        imageops::flip_horizontal(&scaled)
    } else {
        scaled
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(image)
        .context("jpeg encode")?;
    Ok(jpeg)
}
