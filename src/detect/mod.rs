mod analyzer;
mod matcher;
mod pipeline;
pub(crate) mod target;

pub use analyzer::{draw_overlay, Analysis, FrameAnalyzer, PassthroughAnalyzer, TargetAnalyzer};
pub use matcher::{heading_degrees, Calibration, PairSelection, TargetMatcher, TargetPair, TargetReport};
pub use pipeline::{
    parse_steps, rgb_to_hls, rgb_to_hsv, ColorSpace, FilterPipeline, FilterStep, PipelineError, PipelineOutput,
    PreFilter, StepParseError, WorkingImage, DEFAULT_PIPELINE,
};
pub use target::{angle_from_vertical, BoundingBox, RotatedRect, VisionTarget};
