//! targetcamd - robot camera daemon
//!
//! This daemon:
//! 1. Loads configuration (JSON file + TARGETCAM_* environment overrides)
//! 2. Opens the front and rear cameras that can be found
//! 3. Listens for UDP control commands and sends target telemetry
//! 4. Serves the MJPEG stream of the active camera

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use targetcam::{Robot, TargetcamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "TARGETCAM_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = TargetcamConfig::load_from(args.config.as_deref())?;
    if let Some(path) = &args.config {
        log::info!("configuration loaded from {}", path.display());
    }

    let robot = Robot::start(&cfg)?;
    log::info!(
        "targetcamd running: active camera {}, snapshots in {}",
        robot.control().active_camera(),
        cfg.snapshots.dir.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("targetcamd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping cameras...");
    robot.stop()?;

    Ok(())
}
