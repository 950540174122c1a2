//! Wires cameras, control channel and stream server together.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::capture::{CameraHandle, CaptureContext, CaptureOrchestrator, DEFAULT_MAX_READ_FAILURES};
use crate::config::{CameraSettings, TargetcamConfig};
use crate::control::{CommandListener, ControlState, ListenerHandle, TelemetrySender};
use crate::ingest::discover::{capture_devices, find_by_serial, BY_ID_DIR};
use crate::ingest::CameraSource;
use crate::snapshot::SnapshotWriter;
use crate::stream::{CameraFeed, CameraFeeds, StreamConfig, StreamHandle, StreamServer};
use crate::CameraRole;

pub struct Robot {
    control: Arc<ControlState>,
    cameras: Vec<CameraHandle>,
    listener: Option<ListenerHandle>,
    stream: Option<StreamHandle>,
}

impl Robot {
    pub fn start(cfg: &TargetcamConfig) -> Result<Self> {
        Self::start_with_devices(cfg, Path::new(BY_ID_DIR))
    }

    /// Like `start`, resolving camera serials under `by_id_dir`.
    pub fn start_with_devices(cfg: &TargetcamConfig, by_id_dir: &Path) -> Result<Self> {
        let control = Arc::new(ControlState::new());
        if cfg.snapshots.on_startup {
            control.request_snapshot();
        }

        let telemetry = match &cfg.control.telemetry_addr {
            Some(addr) => match TelemetrySender::connect(addr) {
                Ok(sender) => {
                    log::info!("telemetry to udp {}", sender.target());
                    Some(Arc::new(sender))
                }
                Err(err) => {
                    log::warn!("telemetry disabled: {:#}", err);
                    None
                }
            },
            None => None,
        };
        let ctx = CaptureContext {
            control: control.clone(),
            telemetry,
            snapshots: Some(SnapshotWriter::new(&cfg.snapshots.dir)),
            jpeg_quality: cfg.stream.jpeg_quality,
            scale: cfg.stream.scale,
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
            clock_origin: Instant::now(),
        };

        let mut cameras = Vec::new();
        for (settings, device) in resolve_cameras(cfg, by_id_dir)? {
            let role = settings.role;
            let ctx = CaptureContext {
                max_read_failures: settings.max_read_failures,
                ..ctx.clone()
            };
            let started = CameraSource::new(settings.source_config(device.clone())).and_then(|source| {
                CaptureOrchestrator::spawn(role, source, settings.build_analyzer(), ctx)
            });
            match started {
                Ok(handle) => {
                    log::info!("{} camera streaming from {}", role, device);
                    cameras.push(handle);
                }
                Err(err) => log::error!("{} camera unavailable: {:#}", role, err),
            }
        }
        if cameras.is_empty() {
            log::warn!("no camera could be opened; serving control channel only");
        }
        control.select_default_camera();

        let listener = CommandListener::bind(&cfg.control.listen_addr, control.clone())?.spawn()?;

        let mut feeds = CameraFeeds::default();
        for handle in &cameras {
            feeds.set(
                handle.role(),
                CameraFeed {
                    broadcaster: handle.broadcaster().clone(),
                    running: handle.running_flag(),
                },
            );
        }
        let stream = StreamServer::new(
            StreamConfig {
                addr: cfg.stream.addr.clone(),
                frame_lag: cfg.stream.frame_lag,
            },
            feeds,
            control.clone(),
        )
        .spawn()?;

        Ok(Self {
            control,
            cameras,
            listener: Some(listener),
            stream: Some(stream),
        })
    }

    pub fn control(&self) -> &Arc<ControlState> {
        &self.control
    }

    pub fn camera(&self, role: CameraRole) -> Option<&CameraHandle> {
        self.cameras.iter().find(|cam| cam.role() == role)
    }

    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().map(|s| s.addr)
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.addr)
    }

    pub fn stop(mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.stop()?;
        }
        if let Some(listener) = self.listener.take() {
            listener.stop()?;
        }
        for camera in &self.cameras {
            camera.stop();
        }
        for camera in self.cameras.drain(..) {
            camera.join()?;
        }
        Ok(())
    }
}

/// Device path for every camera that can be located.
///
/// An explicit `device` wins over `serial`. When no configured camera
/// resolves, the first two capture devices found become front and rear.
pub fn resolve_cameras(cfg: &TargetcamConfig, by_id_dir: &Path) -> Result<Vec<(CameraSettings, String)>> {
    let mut resolved = Vec::new();
    for cam in cfg.cameras() {
        if let Some(device) = &cam.device {
            resolved.push((cam.clone(), device.clone()));
            continue;
        }
        let Some(serial) = &cam.serial else {
            log::warn!("{} camera has neither device nor serial, skipping", cam.role);
            continue;
        };
        match find_by_serial(by_id_dir, serial)? {
            Some(path) => resolved.push((cam.clone(), path.to_string_lossy().into_owned())),
            None => log::warn!("{} camera with serial {} not found", cam.role, serial),
        }
    }
    if !resolved.is_empty() {
        return Ok(resolved);
    }

    let discovered = capture_devices(by_id_dir)?;
    for ((name, path), role) in discovered.into_iter().zip([CameraRole::Front, CameraRole::Rear]) {
        log::info!("using discovered device {} as {} camera", name, role);
        let settings = cfg
            .camera(role)
            .cloned()
            .unwrap_or_else(|| CameraSettings::new(role));
        resolved.push((settings, path.to_string_lossy().into_owned()));
    }
    Ok(resolved)
}
