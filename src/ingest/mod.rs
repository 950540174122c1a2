//! Camera frame sources.
//!
//! - V4L2 capture devices (feature: camera-v4l2)
//! - Synthetic `stub://` scenes for tests and bench runs
//!
//! Every source produces `RawFrame` values holding an RGB8 image. Device
//! lookup by serial number lives in `discover`.

pub mod discover;
mod normalize;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::Result;
#[cfg(not(feature = "camera-v4l2"))]
use anyhow::anyhow;

use crate::frame::RawFrame;
pub use synthetic::{render_target_pair, SyntheticSource};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::DeviceSource;

pub const STUB_SCHEME: &str = "stub://";

/// Configuration for one camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// Device path (e.g., "/dev/video0") or a `stub://` scene name.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 320,
            height: 240,
            fps: 15,
        }
    }
}

/// Frame statistics for a source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}

/// A camera, backed by a device node or by a synthetic scene.
pub struct CameraSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "camera-v4l2")]
    Device(DeviceSource),
}

impl CameraSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.device.starts_with(STUB_SCHEME) {
            return Ok(Self {
                backend: SourceBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        #[cfg(feature = "camera-v4l2")]
        {
            Ok(Self {
                backend: SourceBackend::Device(DeviceSource::new(config)),
            })
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            Err(anyhow!(
                "camera {} requires the camera-v4l2 feature",
                config.device
            ))
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "camera-v4l2")]
            SourceBackend::Device(source) => source.connect(),
        }
    }

    pub fn next_frame(&mut self) -> Result<RawFrame> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "camera-v4l2")]
            SourceBackend::Device(source) => source.next_frame(),
        }
    }

    /// False once the backing device node has disappeared.
    pub fn is_present(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(_) => true,
            #[cfg(feature = "camera-v4l2")]
            SourceBackend::Device(source) => source.is_present(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "camera-v4l2")]
            SourceBackend::Device(source) => source.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_device_selects_synthetic_source() -> Result<()> {
        let mut source = CameraSource::new(SourceConfig {
            device: "stub://front".to_string(),
            fps: 0,
            ..SourceConfig::default()
        })?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!((frame.width(), frame.height()), (320, 240));
        assert!(source.is_present());
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn device_path_requires_feature() {
        let err = CameraSource::new(SourceConfig::default()).err().unwrap();
        assert!(err.to_string().contains("camera-v4l2"));
    }
}
