//! V4L2 capture device source.
//!
//! Opens a device node, asks for RGB3 at the configured size and rate, and
//! falls back to whatever format the driver settles on when it is one we can
//! normalise (RGB3 or YUYV).

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::path::Path;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{SourceConfig, SourceStats};
use crate::frame::RawFrame;

pub struct DeviceSource {
    config: SourceConfig,
    state: Option<DeviceState>,
    pixel_format: PixelFormat,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            pixel_format: PixelFormat::Rgb24,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("camera {}: failed to set format: {}", self.config.device, err);
                device.format().context("read v4l2 format after set failure")?
            }
        };
        self.pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {}: unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("camera {}: failed to set fps: {}", self.config.device, err);
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "camera {}: connected ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<RawFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .context("capture v4l2 frame")?;
        let image = normalize_to_rgb(buf, self.active_width, self.active_height, self.pixel_format)?;

        self.frame_count += 1;
        Ok(RawFrame::new(image, self.frame_count))
    }

    pub fn is_present(&self) -> bool {
        Path::new(&self.config.device).exists()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}
