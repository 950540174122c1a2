//! Synthetic camera scenes.
//!
//! `stub://<name>` renders a dark frame with a pair of bright green
//! retro-reflective strips that drift slowly left and right, tilted the way
//! the field targets are. `stub://blank` renders the background only.

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use rand::Rng;
use std::time::{Duration, Instant};

use super::{SourceConfig, SourceStats};
use crate::frame::RawFrame;

const BACKGROUND: Rgb<u8> = Rgb([18, 24, 20]);
const STRIP: Rgb<u8> = Rgb([60, 250, 70]);
const STRIP_TILT_DEG: f64 = 14.5;
/// Peak per-channel sensor noise added to every synthetic frame.
const NOISE: i16 = 6;

/// Draws a left/right strip pair centred on `center`. Strip size and spacing
/// scale with the frame height.
pub fn render_target_pair(width: u32, height: u32, center: (f64, f64)) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    let strip_w = (height as f64 / 20.0).max(3.0);
    let strip_h = (height as f64 / 5.5).max(10.0);
    let spacing = strip_h * 0.75;
    for (dx, tilt) in [(-spacing, STRIP_TILT_DEG), (spacing, -STRIP_TILT_DEG)] {
        let poly = strip_corners(center.0 + dx, center.1, strip_w, strip_h, tilt);
        draw_polygon_mut(&mut image, &poly, STRIP);
    }
    image
}

/// Rectangle corners, rotated so the top leans right by `tilt` degrees.
fn strip_corners(cx: f64, cy: f64, w: f64, h: f64, tilt: f64) -> [Point<i32>; 4] {
    let (s, c) = tilt.to_radians().sin_cos();
    [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)].map(|(u, v): (f64, f64)| {
        let (x, y) = (u * w, v * h);
        Point::new((cx + x * c - y * s).round() as i32, (cy + x * s + y * c).round() as i32)
    })
}

fn add_noise(image: &mut RgbImage) {
    let mut rng = rand::thread_rng();
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let jitter = rng.gen_range(-NOISE..=NOISE);
            *channel = (*channel as i16 + jitter).clamp(0, 255) as u8;
        }
    }
}

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("camera {}: connected (synthetic)", self.config.device);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<RawFrame> {
        self.pace();
        self.frame_count += 1;
        let mut image = self.render();
        add_noise(&mut image);
        Ok(RawFrame::new(image, self.frame_count))
    }

    fn render(&self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        if self.config.device.ends_with("blank") {
            return RgbImage::from_pixel(width, height, BACKGROUND);
        }
        let sweep = width as f64 / 8.0;
        let phase = self.frame_count as f64 / 30.0;
        let center = (width as f64 / 2.0 + sweep * phase.sin(), height as f64 / 2.0);
        render_target_pair(width, height, center)
    }

    /// Sleeps off the remainder of the frame interval.
    fn pace(&mut self) {
        if self.config.fps > 0 {
            let interval = Duration::from_secs(1) / self.config.fps;
            if let Some(last) = self.last_frame_at {
                if let Some(remaining) = interval.checked_sub(last.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_are_drawn_symmetrically() {
        let image = render_target_pair(320, 240, (160.0, 120.0));
        let lit: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == STRIP)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!lit.is_empty());
        let left = lit.iter().filter(|(x, _)| *x < 160).count();
        let right = lit.iter().filter(|(x, _)| *x >= 160).count();
        assert!(left.abs_diff(right) <= left / 10, "{left} vs {right}");
    }

    #[test]
    fn blank_scene_has_no_strips() -> Result<()> {
        let mut source = SyntheticSource::new(SourceConfig {
            device: "stub://blank".to_string(),
            fps: 0,
            ..SourceConfig::default()
        });
        let frame = source.next_frame()?;
        assert!(frame.image.pixels().all(|p| p[1] < 40));
        Ok(())
    }
}
