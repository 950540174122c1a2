#![cfg_attr(not(feature = "camera-v4l2"), allow(dead_code))]

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }
}

pub(crate) fn normalize_to_rgb(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<RgbImage> {
    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let rgb = match format {
        PixelFormat::Rgb24 => {
            let expected = pixel_count * 3;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            pixels[..expected].to_vec()
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, pixel_count)?,
    };
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))
}

fn yuyv_to_rgb(pixels: &[u8], pixel_count: usize) -> Result<Vec<u8>> {
    let expected = pixel_count * 2;
    if pixels.len() < expected || pixel_count % 2 != 0 {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for chunk in pixels[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_neutral_chroma_is_gray() -> Result<()> {
        let yuyv = [128u8, 128, 128, 128, 128, 128, 128, 128];
        let rgb = normalize_to_rgb(&yuyv, 2, 2, PixelFormat::Yuyv)?;
        assert_eq!(rgb.as_raw(), &vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb.as_raw(), &pixels);
        assert!(normalize_to_rgb(&pixels, 2, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
