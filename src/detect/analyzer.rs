use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use super::matcher::{TargetMatcher, TargetReport};
use super::pipeline::{FilterPipeline, PipelineError, WorkingImage};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Result of analyzing one frame.
#[derive(Debug)]
pub struct Analysis {
    /// Matcher output; `None` for analyzers that do not look for targets.
    pub report: Option<TargetReport>,
    /// Final pipeline image, when one exists.
    pub processed: Option<WorkingImage>,
    /// Frame to stream, possibly annotated.
    pub display: RgbImage,
}

/// Per-camera frame analysis.
///
/// Implementations may keep state between frames but must not hold on to
/// the borrowed frame.
pub trait FrameAnalyzer: Send {
    fn name(&self) -> &'static str;

    /// True when `analyze` produces target reports worth sending as telemetry.
    fn reports_targets(&self) -> bool;

    fn analyze(&mut self, frame: &RgbImage) -> Result<Analysis, PipelineError>;
}

/// Filter pipeline, pair matcher and overlay drawing.
#[derive(Clone, Debug, Default)]
pub struct TargetAnalyzer {
    pipeline: FilterPipeline,
    matcher: TargetMatcher,
}

impl TargetAnalyzer {
    pub fn new(pipeline: FilterPipeline, matcher: TargetMatcher) -> Self {
        Self { pipeline, matcher }
    }
}

impl FrameAnalyzer for TargetAnalyzer {
    fn name(&self) -> &'static str {
        "target"
    }

    fn reports_targets(&self) -> bool {
        true
    }

    fn analyze(&mut self, frame: &RgbImage) -> Result<Analysis, PipelineError> {
        let output = self.pipeline.process(frame)?;
        let (width, height) = frame.dimensions();
        let report = self.matcher.find(&output.candidates, width, height);
        report.log_summary();

        let mut display = frame.clone();
        draw_overlay(&mut display, &report);
        Ok(Analysis {
            report: Some(report),
            processed: Some(output.mask),
            display,
        })
    }
}

/// Streams frames untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughAnalyzer;

impl FrameAnalyzer for PassthroughAnalyzer {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn reports_targets(&self) -> bool {
        false
    }

    fn analyze(&mut self, frame: &RgbImage) -> Result<Analysis, PipelineError> {
        Ok(Analysis {
            report: None,
            processed: None,
            display: frame.clone(),
        })
    }
}

/// White image centre line, plus the matched strips' rotated boxes and the
/// pair centre line in green.
pub fn draw_overlay(image: &mut RgbImage, report: &TargetReport) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    vertical_line(image, (width / 2) as i32, WHITE);

    let Some(pair) = &report.pair else {
        return;
    };
    for target in [&pair.left, &pair.right] {
        let corners = target.box_points();
        for i in 0..4 {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            for offset in -2..=2 {
                let o = offset as f32;
                draw_line_segment_mut(image, (a.x as f32 + o, a.y as f32), (b.x as f32 + o, b.y as f32), GREEN);
                draw_line_segment_mut(image, (a.x as f32, a.y as f32 + o), (b.x as f32, b.y as f32 + o), GREEN);
            }
        }
    }
    vertical_line(image, pair.center_x, GREEN);
}

fn vertical_line(image: &mut RgbImage, x: i32, color: Rgb<u8>) {
    let bottom = image.height() as f32 - 1.0;
    for dx in 0..2 {
        let x = (x + dx) as f32;
        draw_line_segment_mut(image, (x, 0.0), (x, bottom), color);
    }
}
