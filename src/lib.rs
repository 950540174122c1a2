//! targetcam: robot camera daemon
//!
//! Streams live camera frames to drivers over HTTP while an onboard vision
//! pipeline finds the paired retro-reflective target and reports bearing and
//! range to the robot controller over UDP.
//!
//! # Module Structure
//!
//! - `detect`: filter pipeline, target geometry, pair matching, frame analyzers
//! - `broadcast`: single-writer, many-reader latest-frame broadcast
//! - `capture`: per-camera capture thread
//! - `control`: UDP command listener, shared control state, telemetry
//! - `ingest`: V4L2 and synthetic frame sources, device discovery
//! - `stream`: MJPEG HTTP server
//! - `robot`: assembly of all of the above from `config`

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod broadcast;
pub mod capture;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod robot;
pub mod snapshot;
pub mod stream;

pub use broadcast::{FrameBroadcaster, Recv, Subscriber};
pub use capture::{CameraHandle, CaptureContext, CaptureOrchestrator};
pub use config::TargetcamConfig;
pub use control::{parse_command, Command, ControlState};
pub use detect::{TargetMatcher, TargetReport, VisionTarget};
pub use frame::{EncodedFrame, RawFrame};
pub use robot::Robot;

/// Which way a camera faces on the robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraRole {
    Front,
    Rear,
}

impl CameraRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraRole::Front => "front",
            CameraRole::Rear => "rear",
        }
    }
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(CameraRole::Front),
            "rear" => Ok(CameraRole::Rear),
            other => Err(anyhow!("unknown camera role '{}'", other)),
        }
    }
}
