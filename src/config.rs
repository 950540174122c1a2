use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::DEFAULT_MAX_READ_FAILURES;
use crate::detect::{
    parse_steps, Calibration, FilterPipeline, FilterStep, FrameAnalyzer, PairSelection, PassthroughAnalyzer,
    PreFilter, TargetAnalyzer, TargetMatcher,
};
use crate::ingest::SourceConfig;
use crate::CameraRole;

const DEFAULT_STREAM_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_FRAME_LAG_MS: u64 = 20;
const DEFAULT_JPEG_QUALITY: u32 = 40;
const DEFAULT_SCALE: f32 = 0.5;
const DEFAULT_CONTROL_ADDR: &str = "0.0.0.0:5800";
const DEFAULT_TELEMETRY_ADDR: &str = "10.45.13.2:5801";
const DEFAULT_SNAPSHOT_DIR: &str = "../snapshots";
const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_FPS: u32 = 15;

#[derive(Debug, Deserialize, Default)]
struct TargetcamConfigFile {
    stream: Option<StreamConfigFile>,
    control: Option<ControlConfigFile>,
    snapshots: Option<SnapshotConfigFile>,
    cameras: Option<CamerasConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    addr: Option<String>,
    frame_lag_ms: Option<u64>,
    jpeg_quality: Option<u32>,
    scale: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    listen_addr: Option<String>,
    telemetry_addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigFile {
    dir: Option<PathBuf>,
    on_startup: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct CamerasConfigFile {
    front: Option<CameraConfigFile>,
    rear: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    serial: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    pipeline: Option<Vec<String>>,
    calibration: Option<Calibration>,
    prefilter: Option<PreFilter>,
    pair_selection: Option<PairSelection>,
    max_read_failures: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TargetcamConfig {
    pub stream: StreamSettings,
    pub control: ControlSettings,
    pub snapshots: SnapshotSettings,
    pub front: Option<CameraSettings>,
    pub rear: Option<CameraSettings>,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub addr: String,
    pub frame_lag: Duration,
    pub jpeg_quality: u8,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub listen_addr: String,
    /// `None` disables telemetry.
    pub telemetry_addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub dir: PathBuf,
    pub on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub role: CameraRole,
    /// Device path; takes precedence over `serial`.
    pub device: Option<String>,
    pub serial: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pipeline: Vec<FilterStep>,
    pub calibration: Calibration,
    pub prefilter: PreFilter,
    pub pair_selection: PairSelection,
    pub max_read_failures: u32,
}

impl CameraSettings {
    pub fn new(role: CameraRole) -> Self {
        Self {
            role,
            device: None,
            serial: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            pipeline: default_pipeline(),
            calibration: Calibration::default(),
            prefilter: PreFilter::default(),
            pair_selection: PairSelection::default(),
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
        }
    }

    fn from_file(role: CameraRole, file: CameraConfigFile) -> Result<Self> {
        let defaults = Self::new(role);
        let pipeline = match file.pipeline {
            Some(lines) => parse_steps(&lines).with_context(|| format!("{role} camera pipeline"))?,
            None => defaults.pipeline,
        };
        Ok(Self {
            role,
            device: file.device.filter(|d| !d.trim().is_empty()),
            serial: file.serial.filter(|s| !s.trim().is_empty()),
            width: file.width.unwrap_or(defaults.width),
            height: file.height.unwrap_or(defaults.height),
            fps: file.fps.unwrap_or(defaults.fps),
            pipeline,
            calibration: file.calibration.unwrap_or(defaults.calibration),
            prefilter: file.prefilter.unwrap_or(defaults.prefilter),
            pair_selection: file.pair_selection.unwrap_or(defaults.pair_selection),
            max_read_failures: file.max_read_failures.unwrap_or(defaults.max_read_failures),
        })
    }

    pub fn source_config(&self, device: String) -> SourceConfig {
        SourceConfig {
            device,
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    /// Front cameras look for targets; rear cameras stream untouched.
    pub fn build_analyzer(&self) -> Box<dyn FrameAnalyzer> {
        match self.role {
            CameraRole::Front => Box::new(TargetAnalyzer::new(
                FilterPipeline::new(self.pipeline.clone(), self.prefilter),
                TargetMatcher::new(self.calibration, self.pair_selection),
            )),
            CameraRole::Rear => Box::new(PassthroughAnalyzer),
        }
    }
}

fn default_pipeline() -> Vec<FilterStep> {
    FilterPipeline::default().steps().to_vec()
}

impl TargetcamConfig {
    /// Loads from the file named by `TARGETCAM_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TARGETCAM_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TargetcamConfigFile) -> Result<Self> {
        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            addr: stream_file
                .addr
                .unwrap_or_else(|| DEFAULT_STREAM_ADDR.to_string()),
            frame_lag: Duration::from_millis(stream_file.frame_lag_ms.unwrap_or(DEFAULT_FRAME_LAG_MS)),
            jpeg_quality: quality(stream_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY))?,
            scale: stream_file.scale.unwrap_or(DEFAULT_SCALE),
        };
        let control_file = file.control.unwrap_or_default();
        let control = ControlSettings {
            listen_addr: control_file
                .listen_addr
                .unwrap_or_else(|| DEFAULT_CONTROL_ADDR.to_string()),
            telemetry_addr: match control_file.telemetry_addr {
                Some(addr) if addr.trim().is_empty() => None,
                Some(addr) => Some(addr),
                None => Some(DEFAULT_TELEMETRY_ADDR.to_string()),
            },
        };
        let snapshot_file = file.snapshots.unwrap_or_default();
        let snapshots = SnapshotSettings {
            dir: snapshot_file
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            on_startup: snapshot_file.on_startup.unwrap_or(true),
        };
        let cameras = file.cameras.unwrap_or_default();
        let front = cameras
            .front
            .map(|cam| CameraSettings::from_file(CameraRole::Front, cam))
            .transpose()?;
        let rear = cameras
            .rear
            .map(|cam| CameraSettings::from_file(CameraRole::Rear, cam))
            .transpose()?;
        Ok(Self {
            stream,
            control,
            snapshots,
            front,
            rear,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("TARGETCAM_STREAM_ADDR") {
            self.stream.addr = addr;
        }
        if let Some(addr) = non_empty_env("TARGETCAM_CONTROL_ADDR") {
            self.control.listen_addr = addr;
        }
        if let Some(addr) = non_empty_env("TARGETCAM_TELEMETRY_ADDR") {
            self.control.telemetry_addr = Some(addr);
        }
        if let Some(value) = non_empty_env("TARGETCAM_JPEG_QUALITY") {
            let parsed: u32 = value
                .parse()
                .map_err(|_| anyhow!("TARGETCAM_JPEG_QUALITY must be an integer between 1 and 100"))?;
            self.stream.jpeg_quality = quality(parsed)?;
        }
        if let Some(dir) = non_empty_env("TARGETCAM_SNAPSHOT_DIR") {
            self.snapshots.dir = PathBuf::from(dir);
        }
        if let Some(device) = non_empty_env("TARGETCAM_FRONT_DEVICE") {
            self.camera_mut(CameraRole::Front).device = Some(device);
        }
        if let Some(device) = non_empty_env("TARGETCAM_REAR_DEVICE") {
            self.camera_mut(CameraRole::Rear).device = Some(device);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.stream.scale > 0.0 && self.stream.scale <= 1.0) {
            return Err(anyhow!("stream scale must be in (0, 1], got {}", self.stream.scale));
        }
        for cam in self.cameras() {
            if cam.width == 0 || cam.height == 0 {
                return Err(anyhow!("{} camera width and height must be greater than zero", cam.role));
            }
            if cam.max_read_failures == 0 {
                return Err(anyhow!("{} camera max_read_failures must be greater than zero", cam.role));
            }
        }
        Ok(())
    }

    pub fn camera(&self, role: CameraRole) -> Option<&CameraSettings> {
        match role {
            CameraRole::Front => self.front.as_ref(),
            CameraRole::Rear => self.rear.as_ref(),
        }
    }

    fn camera_mut(&mut self, role: CameraRole) -> &mut CameraSettings {
        let slot = match role {
            CameraRole::Front => &mut self.front,
            CameraRole::Rear => &mut self.rear,
        };
        slot.get_or_insert_with(|| CameraSettings::new(role))
    }

    pub fn cameras(&self) -> impl Iterator<Item = &CameraSettings> {
        self.front.iter().chain(self.rear.iter())
    }
}

fn quality(value: u32) -> Result<u8> {
    if !(1..=100).contains(&value) {
        return Err(anyhow!("jpeg_quality must be between 1 and 100, got {value}"));
    }
    Ok(value as u8)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<TargetcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DEFAULT_PIPELINE;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let cfg = TargetcamConfig::from_file(TargetcamConfigFile::default())?;
        assert_eq!(cfg.stream.addr, "0.0.0.0:5000");
        assert_eq!(cfg.stream.frame_lag, Duration::from_millis(20));
        assert_eq!(cfg.stream.jpeg_quality, 40);
        assert_eq!(cfg.control.telemetry_addr.as_deref(), Some("10.45.13.2:5801"));
        assert!(cfg.snapshots.on_startup);
        assert!(cfg.front.is_none() && cfg.rear.is_none());
        cfg.validate()?;
        Ok(())
    }

    #[test]
    fn default_camera_uses_default_pipeline() {
        let cam = CameraSettings::new(CameraRole::Front);
        let rendered: Vec<String> = cam.pipeline.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, DEFAULT_PIPELINE);
        assert_eq!(cam.build_analyzer().name(), "target");
        assert_eq!(CameraSettings::new(CameraRole::Rear).build_analyzer().name(), "passthrough");
    }

    #[test]
    fn bad_pipeline_line_is_a_load_error() {
        let file = CameraConfigFile {
            pipeline: Some(vec!["erode".to_string()]),
            ..CameraConfigFile::default()
        };
        let err = CameraSettings::from_file(CameraRole::Front, file).unwrap_err();
        assert!(format!("{err:#}").contains("front camera pipeline"));
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        assert!(quality(0).is_err());
        assert!(quality(101).is_err());
        assert_eq!(quality(90).unwrap(), 90);
    }
}
