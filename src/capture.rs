//! Per-camera capture loop.
//!
//! Each camera gets one named thread that reads a frame, analyzes it, reports
//! telemetry, encodes the stream image, publishes it and services snapshot
//! requests. A camera that stops delivering frames closes its broadcaster
//! and exits without affecting the other camera.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::broadcast::FrameBroadcaster;
use crate::control::{ControlState, TelemetrySender};
use crate::detect::{Analysis, FrameAnalyzer, TargetReport};
use crate::frame::{encode_jpeg, prepare_stream_image, EncodedFrame, RawFrame};
use crate::ingest::CameraSource;
use crate::snapshot::SnapshotWriter;
use crate::CameraRole;

pub const DEFAULT_MAX_READ_FAILURES: u32 = 30;
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Everything a capture thread shares with the rest of the robot.
#[derive(Clone)]
pub struct CaptureContext {
    pub control: Arc<ControlState>,
    pub telemetry: Option<Arc<TelemetrySender>>,
    pub snapshots: Option<SnapshotWriter>,
    pub jpeg_quality: u8,
    pub scale: f32,
    pub max_read_failures: u32,
    /// Telemetry timestamps count seconds from here.
    pub clock_origin: Instant,
}

impl CaptureContext {
    pub fn new(control: Arc<ControlState>) -> Self {
        Self {
            control,
            telemetry: None,
            snapshots: None,
            jpeg_quality: 40,
            scale: 0.5,
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
            clock_origin: Instant::now(),
        }
    }
}

pub struct CameraHandle {
    role: CameraRole,
    broadcaster: FrameBroadcaster,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CameraHandle {
    pub fn role(&self) -> CameraRole {
        self.role
    }

    pub fn broadcaster(&self) -> &FrameBroadcaster {
        &self.broadcaster
    }

    /// Shared flag, cleared when the capture thread exits.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the thread to stop after the current frame.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn join(mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("capture thread for {} camera panicked", self.role))?;
        }
        Ok(())
    }
}

pub struct CaptureOrchestrator;

impl CaptureOrchestrator {
    /// Connects `source` and starts its capture thread. Blocks until the
    /// first frame is published or a short timeout passes.
    ///
    /// The camera is marked available in the control state while the thread
    /// runs; on exit it is marked absent and the default camera re-selected.
    pub fn spawn(
        role: CameraRole,
        mut source: CameraSource,
        analyzer: Box<dyn FrameAnalyzer>,
        ctx: CaptureContext,
    ) -> Result<CameraHandle> {
        source
            .connect()
            .with_context(|| format!("open {role} camera"))?;
        ctx.control.set_available(role, true);

        let broadcaster = FrameBroadcaster::new();
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut worker = CaptureLoop {
            role,
            source,
            analyzer,
            ctx,
            broadcaster: broadcaster.clone(),
            shutdown: shutdown.clone(),
        };
        let running_thread = running.clone();
        let join = std::thread::Builder::new()
            .name(format!("capture-{role}"))
            .spawn(move || {
                worker.run();
                running_thread.store(false, Ordering::SeqCst);
            })?;

        if !broadcaster.wait_for_first_frame(FIRST_FRAME_TIMEOUT) {
            log::warn!("{} camera: no frame within {:?}", role, FIRST_FRAME_TIMEOUT);
        }
        Ok(CameraHandle {
            role,
            broadcaster,
            running,
            shutdown,
            join: Some(join),
        })
    }
}

struct CaptureLoop {
    role: CameraRole,
    source: CameraSource,
    analyzer: Box<dyn FrameAnalyzer>,
    ctx: CaptureContext,
    broadcaster: FrameBroadcaster,
    shutdown: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn run(&mut self) {
        log::info!("{} camera: capture started ({})", self.role, self.analyzer.name());
        let mut failures = 0u32;
        while !self.shutdown.load(Ordering::SeqCst) {
            let frame = match self.source.next_frame() {
                Ok(frame) => {
                    failures = 0;
                    frame
                }
                Err(err) => {
                    failures += 1;
                    log::warn!("{} camera: frame read failed ({}): {:#}", self.role, failures, err);
                    if !self.source.is_present() {
                        log::error!("{} camera: device gone, closing stream", self.role);
                        break;
                    }
                    if failures >= self.ctx.max_read_failures {
                        log::error!(
                            "{} camera: {} consecutive read failures, closing stream",
                            self.role,
                            failures
                        );
                        break;
                    }
                    std::thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
            };
            if let Err(err) = self.process(frame) {
                log::warn!("{} camera: frame dropped: {:#}", self.role, err);
            }
        }
        // Switch viewers away before they see the stream close.
        self.ctx.control.set_available(self.role, false);
        self.ctx.control.select_default_camera();
        self.broadcaster.close();
        let stats = self.source.stats();
        log::info!(
            "{} camera: capture stopped after {} frames from {}",
            self.role,
            stats.frames_captured,
            stats.device
        );
    }

    fn process(&mut self, frame: RawFrame) -> Result<()> {
        let analysis = match self.analyzer.analyze(&frame.image) {
            Ok(analysis) => analysis,
            Err(err) => {
                log::warn!("{} camera: analysis failed: {}", self.role, err);
                Analysis {
                    report: self.analyzer.reports_targets().then(TargetReport::none),
                    processed: None,
                    display: frame.image.clone(),
                }
            }
        };

        if let (Some(report), Some(telemetry)) = (&analysis.report, &self.ctx.telemetry) {
            let timestamp = self.ctx.clock_origin.elapsed().as_secs_f64();
            if let Err(err) = telemetry.send_report(self.role, report, timestamp) {
                log::debug!("{} camera: {:#}", self.role, err);
            }
        }

        let stream_image = prepare_stream_image(&analysis.display, self.ctx.scale, self.ctx.control.flip_image());
        let jpeg = encode_jpeg(&stream_image, self.ctx.jpeg_quality)?;
        self.broadcaster.publish(EncodedFrame {
            seq: frame.seq,
            jpeg,
            captured_at: frame.captured_at,
        });

        if self.ctx.control.take_snapshot_request() {
            self.save_snapshot(&frame, &analysis);
        }
        Ok(())
    }

    fn save_snapshot(&self, frame: &RawFrame, analysis: &Analysis) {
        let Some(writer) = &self.ctx.snapshots else {
            log::debug!("{} camera: snapshot requested but no snapshot dir configured", self.role);
            return;
        };
        let processed = match &analysis.processed {
            Some(image) => image.to_rgb(),
            None => analysis.display.clone(),
        };
        if let Err(err) = writer.write_pair(&frame.image, &processed) {
            log::warn!("{} camera: snapshot failed: {:#}", self.role, err);
        }
    }
}
