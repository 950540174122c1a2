//! analyze_snapshot - run the front-camera analyzer on a saved image

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use targetcam::config::CameraSettings;
use targetcam::control::format_report;
use targetcam::detect::TargetReport;
use targetcam::frame::{encode_jpeg, SNAPSHOT_JPEG_QUALITY};
use targetcam::{CameraRole, TargetcamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to analyze (JPEG or PNG).
    image: PathBuf,
    /// JSON configuration file; the front camera section supplies the pipeline.
    #[arg(long, env = "TARGETCAM_CONFIG")]
    config: Option<PathBuf>,
    /// Directory for the processed mask and annotated image.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = TargetcamConfig::load_from(args.config.as_deref())?;
    let settings = cfg
        .camera(CameraRole::Front)
        .cloned()
        .unwrap_or_else(|| CameraSettings::new(CameraRole::Front));
    let frame = image::open(&args.image)
        .with_context(|| format!("open {}", args.image.display()))?
        .into_rgb8();

    let mut analyzer = settings.build_analyzer();
    let analysis = analyzer.analyze(&frame)?;
    let report = analysis.report.clone().unwrap_or_else(TargetReport::none);
    println!("{}", format_report(CameraRole::Front, &report, 0.0));
    if let Some(pair) = &report.pair {
        println!("heading: {:.3} degrees", pair.heading);
        println!("distance (target gap): {:.3} inches", pair.distance_from_gap);
        println!("distance (vertical, standard): {:.3} inches", pair.distance_from_vertical_standard);
        println!("distance (vertical, rocket): {:.3} inches", pair.distance_from_vertical_rocket);
    }

    if let Some(out) = &args.out {
        std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
        let stem = args
            .image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        if let Some(mask) = &analysis.processed {
            let path = out.join(format!("{stem}-mask.jpg"));
            std::fs::write(&path, encode_jpeg(&mask.to_rgb(), SNAPSHOT_JPEG_QUALITY)?)?;
            log::info!("mask written to {}", path.display());
        }
        let path = out.join(format!("{stem}-annotated.jpg"));
        std::fs::write(&path, encode_jpeg(&analysis.display, SNAPSHOT_JPEG_QUALITY)?)?;
        log::info!("annotated image written to {}", path.display());
    }
    Ok(())
}
