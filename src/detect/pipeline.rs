//! Configurable image filter pipeline.
//!
//! A pipeline is an ordered list of steps parsed from text lines such as
//! `rgb_filter 0 255 218 255 0 255` or `erode 2`. The steps run over a copy of
//! the frame, the resulting binary mask is traced for contours, and every
//! contour that passes the pre-filter becomes a `VisionTarget` candidate.
//!
//! Unrecognised step names are kept as pass-through steps so that older
//! configuration files keep loading.

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use serde::Deserialize;

use super::target::VisionTarget;

/// OpenCV's fixed 5-tap kernel for a 5x5 Gaussian with sigma 0 (sigma 1.1).
const GAUSSIAN_KERNEL: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

pub const DEFAULT_PIPELINE: &[&str] = &[
    "gaussian_blur",
    "rgb_filter 0 255 218 255 0 255",
    "erode 2",
    "dilate 2",
];

/// Per-frame pipeline failure. The frame yields no candidates.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("step `{step}` requires a three-channel image")]
    RequiresColor { step: &'static str },
    #[error("contour extraction requires a single-channel mask")]
    MaskNotSingleChannel,
}

/// Configuration-time failure while parsing a step line.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StepParseError {
    #[error("step `{step}` expects {expected} numeric arguments, got {found}")]
    ArgumentCount {
        step: String,
        expected: usize,
        found: usize,
    },
    #[error("step `{step}` has non-numeric argument `{value}`")]
    InvalidArgument { step: String, value: String },
    #[error("empty step")]
    Empty,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Hsv,
    Hls,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterStep {
    GaussianBlur,
    ToHls,
    ToGray,
    BinaryThreshold { threshold: u8, max_value: u8 },
    Erode { iterations: u8 },
    Dilate { iterations: u8 },
    ChannelRange {
        space: ColorSpace,
        lower: [u8; 3],
        upper: [u8; 3],
    },
    /// Unknown step name, applied as a no-op.
    Passthrough(String),
}

impl FromStr for FilterStep {
    type Err = StepParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or(StepParseError::Empty)?;
        let args: Vec<&str> = parts.collect();
        let step = match name.to_ascii_uppercase().as_str() {
            "GAUSSIAN_BLUR" => FilterStep::GaussianBlur,
            "BGR2HSL" => FilterStep::ToHls,
            "BGR2GRAY" => FilterStep::ToGray,
            "BINARY_THRESHOLD" => {
                let [threshold, max_value] = numeric_args(name, &args)?;
                FilterStep::BinaryThreshold {
                    threshold,
                    max_value,
                }
            }
            "ERODE" => {
                let [iterations] = numeric_args(name, &args)?;
                FilterStep::Erode { iterations }
            }
            "DILATE" => {
                let [iterations] = numeric_args(name, &args)?;
                FilterStep::Dilate { iterations }
            }
            "HSL_FILTER" => channel_range(name, ColorSpace::Hls, &args)?,
            "HSV_FILTER" => channel_range(name, ColorSpace::Hsv, &args)?,
            "RGB_FILTER" => channel_range(name, ColorSpace::Rgb, &args)?,
            _ => FilterStep::Passthrough(name.to_string()),
        };
        Ok(step)
    }
}

impl fmt::Display for FilterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStep::GaussianBlur => write!(f, "gaussian_blur"),
            FilterStep::ToHls => write!(f, "bgr2hsl"),
            FilterStep::ToGray => write!(f, "bgr2gray"),
            FilterStep::BinaryThreshold {
                threshold,
                max_value,
            } => write!(f, "binary_threshold {threshold} {max_value}"),
            FilterStep::Erode { iterations } => write!(f, "erode {iterations}"),
            FilterStep::Dilate { iterations } => write!(f, "dilate {iterations}"),
            FilterStep::ChannelRange {
                space,
                lower,
                upper,
            } => {
                let name = match space {
                    ColorSpace::Rgb => "rgb_filter",
                    ColorSpace::Hsv => "hsv_filter",
                    ColorSpace::Hls => "hsl_filter",
                };
                write!(
                    f,
                    "{name} {} {} {} {} {} {}",
                    lower[0], upper[0], lower[1], upper[1], lower[2], upper[2]
                )
            }
            FilterStep::Passthrough(name) => write!(f, "{name}"),
        }
    }
}

fn numeric_args<const N: usize>(step: &str, args: &[&str]) -> Result<[u8; N], StepParseError> {
    if args.len() < N {
        return Err(StepParseError::ArgumentCount {
            step: step.to_string(),
            expected: N,
            found: args.len(),
        });
    }
    let mut out = [0u8; N];
    for (slot, raw) in out.iter_mut().zip(args) {
        let value: f64 = raw.parse().map_err(|_| StepParseError::InvalidArgument {
            step: step.to_string(),
            value: raw.to_string(),
        })?;
        *slot = value.clamp(0.0, 255.0) as u8;
    }
    Ok(out)
}

fn channel_range(step: &str, space: ColorSpace, args: &[&str]) -> Result<FilterStep, StepParseError> {
    let [l0, h0, l1, h1, l2, h2] = numeric_args(step, args)?;
    Ok(FilterStep::ChannelRange {
        space,
        lower: [l0, l1, l2],
        upper: [h0, h1, h2],
    })
}

/// Parses step lines, skipping blank ones.
pub fn parse_steps<S: AsRef<str>>(lines: &[S]) -> Result<Vec<FilterStep>, StepParseError> {
    lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .map(FilterStep::from_str)
        .collect()
}

/// Image flowing between steps.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkingImage {
    Color(RgbImage),
    Gray(GrayImage),
}

impl WorkingImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            WorkingImage::Color(img) => img.dimensions(),
            WorkingImage::Gray(img) => img.dimensions(),
        }
    }

    /// Expands to RGB for encoding alongside colour frames.
    pub fn to_rgb(&self) -> RgbImage {
        match self {
            WorkingImage::Color(img) => img.clone(),
            WorkingImage::Gray(img) => {
                RgbImage::from_fn(img.width(), img.height(), |x, y| {
                    let v = img.get_pixel(x, y)[0];
                    Rgb([v, v, v])
                })
            }
        }
    }
}

impl FilterStep {
    pub fn apply(&self, image: WorkingImage) -> Result<WorkingImage, PipelineError> {
        match self {
            FilterStep::GaussianBlur => Ok(match image {
                WorkingImage::Color(img) => {
                    WorkingImage::Color(imageproc::filter::separable_filter_equal(&img, &GAUSSIAN_KERNEL))
                }
                WorkingImage::Gray(img) => {
                    WorkingImage::Gray(imageproc::filter::separable_filter_equal(&img, &GAUSSIAN_KERNEL))
                }
            }),
            FilterStep::ToHls => {
                let img = require_color(image, "bgr2hsl")?;
                Ok(WorkingImage::Color(convert(&img, rgb_to_hls)))
            }
            FilterStep::ToGray => {
                let img = require_color(image, "bgr2gray")?;
                Ok(WorkingImage::Gray(image::imageops::grayscale(&img)))
            }
            FilterStep::BinaryThreshold {
                threshold,
                max_value,
            } => {
                let (t, m) = (*threshold, *max_value);
                let cut = move |v: u8| if v > t { m } else { 0 };
                Ok(match image {
                    WorkingImage::Color(mut img) => {
                        img.pixels_mut().for_each(|p| p.0 = p.0.map(cut));
                        WorkingImage::Color(img)
                    }
                    WorkingImage::Gray(mut img) => {
                        img.pixels_mut().for_each(|p| p.0[0] = cut(p.0[0]));
                        WorkingImage::Gray(img)
                    }
                })
            }
            FilterStep::Erode { iterations } => Ok(morph(image, *iterations, grayscale_erode)),
            FilterStep::Dilate { iterations } => Ok(morph(image, *iterations, grayscale_dilate)),
            FilterStep::ChannelRange {
                space,
                lower,
                upper,
            } => {
                let img = require_color(image, "channel range filter")?;
                let to_space: fn([u8; 3]) -> [u8; 3] = match space {
                    ColorSpace::Rgb => |p| p,
                    ColorSpace::Hsv => rgb_to_hsv,
                    ColorSpace::Hls => rgb_to_hls,
                };
                let mask = GrayImage::from_fn(img.width(), img.height(), |x, y| {
                    let p = to_space(img.get_pixel(x, y).0);
                    let inside = (0..3).all(|c| p[c] >= lower[c] && p[c] <= upper[c]);
                    Luma([if inside { 255 } else { 0 }])
                });
                Ok(WorkingImage::Gray(mask))
            }
            FilterStep::Passthrough(_) => Ok(image),
        }
    }
}

fn require_color(image: WorkingImage, step: &'static str) -> Result<RgbImage, PipelineError> {
    match image {
        WorkingImage::Color(img) => Ok(img),
        WorkingImage::Gray(_) => Err(PipelineError::RequiresColor { step }),
    }
}

fn convert(img: &RgbImage, f: fn([u8; 3]) -> [u8; 3]) -> RgbImage {
    let mut out = img.clone();
    out.pixels_mut().for_each(|p| p.0 = f(p.0));
    out
}

/// Min (erode) or max (dilate) over a 3x3 square, `iterations` passes, per
/// channel. Pixels outside the image do not take part.
fn morph(image: WorkingImage, iterations: u8, op: fn(&GrayImage, &Mask) -> GrayImage) -> WorkingImage {
    if iterations == 0 {
        return image;
    }
    let square = Mask::square(1);
    let repeat = |plane: GrayImage| (0..iterations).fold(plane, |acc, _| op(&acc, &square));
    match image {
        WorkingImage::Gray(img) => WorkingImage::Gray(repeat(img)),
        WorkingImage::Color(img) => {
            let planes: Vec<GrayImage> = (0..3)
                .map(|c| {
                    repeat(GrayImage::from_fn(img.width(), img.height(), |x, y| {
                        Luma([img.get_pixel(x, y)[c]])
                    }))
                })
                .collect();
            WorkingImage::Color(RgbImage::from_fn(img.width(), img.height(), |x, y| {
                Rgb([
                    planes[0].get_pixel(x, y)[0],
                    planes[1].get_pixel(x, y)[0],
                    planes[2].get_pixel(x, y)[0],
                ])
            }))
        }
    }
}

/// 8-bit hue in OpenCV's 0..180 range, from channel max/min.
fn hue(r: f32, g: f32, b: f32, max: f32, diff: f32) -> u8 {
    if diff == 0.0 {
        return 0;
    }
    let mut h = if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    (h / 2.0).round().min(180.0) as u8
}

/// RGB to OpenCV 8-bit HSV: H 0..180, S and V 0..255.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;
    let s = if max == 0.0 { 0.0 } else { diff / max * 255.0 };
    [hue(r, g, b, max, diff), s.round() as u8, max as u8]
}

/// RGB to OpenCV 8-bit HLS: H 0..180, L and S 0..255.
pub fn rgb_to_hls([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;
    let l = (max + min) / 2.0 / 255.0;
    let s = if diff == 0.0 {
        0.0
    } else if l < 0.5 {
        diff / (max + min)
    } else {
        diff / (2.0 * 255.0 - max - min)
    };
    [
        hue(r, g, b, max, diff),
        (l * 255.0).round() as u8,
        (s * 255.0).round().min(255.0) as u8,
    ]
}

/// Size and shape bounds for candidate contours; both ranges are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreFilter {
    pub min_area: f64,
    pub max_area: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
}

impl Default for PreFilter {
    fn default() -> Self {
        Self {
            min_area: 75.0,
            max_area: 60_000.0,
            min_aspect_ratio: 0.1,
            max_aspect_ratio: 0.8,
        }
    }
}

impl PreFilter {
    pub fn accepts(&self, target: &VisionTarget) -> bool {
        let area = target.area();
        if area <= self.min_area || area >= self.max_area {
            return false;
        }
        let aspect = target.bounding_box().aspect_ratio();
        aspect > self.min_aspect_ratio && aspect < self.max_aspect_ratio
    }
}

/// Candidates plus the final mask (kept for snapshots and debugging).
#[derive(Debug)]
pub struct PipelineOutput {
    pub candidates: Vec<VisionTarget>,
    pub mask: WorkingImage,
}

#[derive(Clone, Debug)]
pub struct FilterPipeline {
    steps: Vec<FilterStep>,
    prefilter: PreFilter,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        let steps = DEFAULT_PIPELINE
            .iter()
            .filter_map(|line| line.parse().ok())
            .collect();
        Self::new(steps, PreFilter::default())
    }
}

impl FilterPipeline {
    pub fn new(steps: Vec<FilterStep>, prefilter: PreFilter) -> Self {
        Self { steps, prefilter }
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    /// Runs every step over a copy of `frame`, then extracts candidates.
    pub fn process(&self, frame: &RgbImage) -> Result<PipelineOutput, PipelineError> {
        let mask = self.apply_steps(WorkingImage::Color(frame.clone()))?;
        let candidates = self.extract_candidates(&mask)?;
        Ok(PipelineOutput { candidates, mask })
    }

    pub fn apply_steps(&self, image: WorkingImage) -> Result<WorkingImage, PipelineError> {
        self.steps.iter().try_fold(image, |img, step| step.apply(img))
    }

    /// Traces every border of the mask, in discovery order, and keeps the
    /// contours the pre-filter accepts.
    pub fn extract_candidates(&self, mask: &WorkingImage) -> Result<Vec<VisionTarget>, PipelineError> {
        let WorkingImage::Gray(mask) = mask else {
            return Err(PipelineError::MaskNotSingleChannel);
        };
        Ok(find_contours::<i32>(mask)
            .into_iter()
            .filter_map(|contour| VisionTarget::from_contour(contour.points))
            .filter(|target| self.prefilter.accepts(target))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::target::tests::tilted_bar;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]))
    }

    #[test]
    fn parses_default_pipeline() {
        let steps = parse_steps(DEFAULT_PIPELINE).unwrap();
        assert_eq!(
            steps,
            vec![
                FilterStep::GaussianBlur,
                FilterStep::ChannelRange {
                    space: ColorSpace::Rgb,
                    lower: [0, 218, 0],
                    upper: [255, 255, 255],
                },
                FilterStep::Erode { iterations: 2 },
                FilterStep::Dilate { iterations: 2 },
            ]
        );
        let rendered: Vec<String> = steps.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, DEFAULT_PIPELINE);
    }

    #[test]
    fn step_names_are_case_insensitive_and_unknown_names_pass_through() {
        assert_eq!("ERODE 3".parse::<FilterStep>().unwrap(), FilterStep::Erode { iterations: 3 });
        assert_eq!(
            "sharpen 4".parse::<FilterStep>().unwrap(),
            FilterStep::Passthrough("sharpen".to_string())
        );
    }

    #[test]
    fn known_steps_reject_bad_arguments() {
        assert!(matches!(
            "erode".parse::<FilterStep>(),
            Err(StepParseError::ArgumentCount { expected: 1, found: 0, .. })
        ));
        assert!(matches!(
            "hsv_filter 0 1 2 x 4 5".parse::<FilterStep>(),
            Err(StepParseError::InvalidArgument { .. })
        ));
        assert_eq!(parse_steps(&["", "  ", "dilate 1"]).unwrap().len(), 1);
    }

    #[test]
    fn unknown_step_leaves_image_unmodified() {
        let frame = gradient(32, 24);
        let step: FilterStep = "posterize 3".parse().unwrap();
        let out = step.apply(WorkingImage::Color(frame.clone())).unwrap();
        assert_eq!(out, WorkingImage::Color(frame));
    }

    #[test]
    fn channel_range_on_gray_image_fails() {
        let step: FilterStep = "rgb_filter 0 255 0 255 0 255".parse().unwrap();
        let gray = WorkingImage::Gray(GrayImage::new(4, 4));
        assert!(matches!(step.apply(gray), Err(PipelineError::RequiresColor { .. })));
    }

    #[test]
    fn contour_extraction_requires_mask() {
        let pipeline = FilterPipeline::new(vec![], PreFilter::default());
        let err = pipeline.process(&gradient(16, 16)).unwrap_err();
        assert!(matches!(err, PipelineError::MaskNotSingleChannel));
    }

    #[test]
    fn binary_threshold_is_strictly_greater() {
        let mut gray = GrayImage::new(3, 1);
        gray.put_pixel(0, 0, Luma([99]));
        gray.put_pixel(1, 0, Luma([100]));
        gray.put_pixel(2, 0, Luma([101]));
        let step = FilterStep::BinaryThreshold {
            threshold: 100,
            max_value: 255,
        };
        let WorkingImage::Gray(out) = step.apply(WorkingImage::Gray(gray)).unwrap() else {
            panic!("threshold changed channel count");
        };
        assert_eq!(out.as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn color_conversions_match_opencv_ranges() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hls([255, 255, 255]), [0, 255, 0]);
        assert_eq!(rgb_to_hls([0, 255, 0]), [60, 128, 255]);
    }

    #[test]
    fn erode_removes_specks_and_dilate_restores_blocks() {
        let mut mask = GrayImage::new(40, 40);
        mask.put_pixel(3, 3, Luma([255]));
        for y in 10..30 {
            for x in 10..30 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let opened = parse_steps(&["erode 2", "dilate 2"]).unwrap();
        let pipeline = FilterPipeline::new(opened, PreFilter::default());
        let WorkingImage::Gray(out) = pipeline.apply_steps(WorkingImage::Gray(mask)).unwrap() else {
            panic!("morphology changed channel count");
        };
        assert_eq!(out.get_pixel(3, 3)[0], 0);
        assert_eq!(out.get_pixel(20, 20)[0], 255);
        assert_eq!(out.get_pixel(10, 10)[0], 255);
    }

    #[test]
    fn morphology_is_a_min_max_filter_on_grey_levels() {
        let step: FilterStep = "erode 1".parse().unwrap();
        let WorkingImage::Gray(out) = step.apply(WorkingImage::Gray(GrayImage::from_pixel(9, 9, Luma([100])))).unwrap()
        else {
            panic!("erode changed channel count");
        };
        assert_eq!(out.get_pixel(4, 4)[0], 100);

        let mut ramp = GrayImage::from_pixel(9, 9, Luma([40]));
        ramp.put_pixel(4, 4, Luma([90]));
        let dilate: FilterStep = "dilate 1".parse().unwrap();
        let WorkingImage::Gray(out) = dilate.apply(WorkingImage::Gray(ramp.clone())).unwrap() else {
            panic!("dilate changed channel count");
        };
        assert_eq!(out.get_pixel(5, 5)[0], 90);
        assert_eq!(out.get_pixel(6, 6)[0], 40);
        let WorkingImage::Gray(out) = step.apply(WorkingImage::Gray(ramp)).unwrap() else {
            panic!("erode changed channel count");
        };
        assert_eq!(out.get_pixel(4, 4)[0], 40);
    }

    #[test]
    fn morphology_keeps_colour_channels_apart() {
        let frame = RgbImage::from_pixel(7, 7, Rgb([10, 200, 30]));
        let step: FilterStep = "dilate 2".parse().unwrap();
        let WorkingImage::Color(out) = step.apply(WorkingImage::Color(frame)).unwrap() else {
            panic!("dilate changed channel count");
        };
        assert_eq!(out.get_pixel(3, 3).0, [10, 200, 30]);
    }

    #[test]
    fn gaussian_blur_uses_a_five_tap_kernel() {
        let flat = GrayImage::from_pixel(12, 12, Luma([100]));
        let WorkingImage::Gray(out) = FilterStep::GaussianBlur.apply(WorkingImage::Gray(flat)).unwrap() else {
            panic!("blur changed channel count");
        };
        assert_eq!(out.get_pixel(6, 6)[0], 100);

        let mut spot = GrayImage::new(12, 12);
        spot.put_pixel(6, 6, Luma([255]));
        let WorkingImage::Gray(out) = FilterStep::GaussianBlur.apply(WorkingImage::Gray(spot)).unwrap() else {
            panic!("blur changed channel count");
        };
        assert!((35..=36).contains(&out.get_pixel(6, 6)[0]));
        assert!(out.get_pixel(8, 6)[0] > 0);
        assert_eq!(out.get_pixel(9, 6)[0], 0);
    }

    #[test]
    fn prefilter_bounds_are_exclusive() {
        let prefilter = PreFilter::default();
        // 5 x 15 rectangle: area 75 exactly.
        let at_min = VisionTarget::from_contour(vec![
            imageproc::point::Point::new(0, 0),
            imageproc::point::Point::new(5, 0),
            imageproc::point::Point::new(5, 15),
            imageproc::point::Point::new(0, 15),
        ])
        .unwrap();
        assert_eq!(at_min.area(), 75.0);
        assert!(!prefilter.accepts(&at_min));

        // 6 x 15: area 90, aspect 7/16.
        let inside = VisionTarget::from_contour(vec![
            imageproc::point::Point::new(0, 0),
            imageproc::point::Point::new(6, 0),
            imageproc::point::Point::new(6, 15),
            imageproc::point::Point::new(0, 15),
        ])
        .unwrap();
        assert!(prefilter.accepts(&inside));

        // Wide box: aspect > 0.8.
        let wide = VisionTarget::from_contour(vec![
            imageproc::point::Point::new(0, 0),
            imageproc::point::Point::new(30, 0),
            imageproc::point::Point::new(30, 15),
            imageproc::point::Point::new(0, 15),
        ])
        .unwrap();
        assert!(!prefilter.accepts(&wide));

        // 200 x 300: area 60000 exactly.
        let at_max = VisionTarget::from_contour(vec![
            imageproc::point::Point::new(0, 0),
            imageproc::point::Point::new(200, 0),
            imageproc::point::Point::new(200, 300),
            imageproc::point::Point::new(0, 300),
        ])
        .unwrap();
        assert_eq!(at_max.area(), 60_000.0);
        assert!(!prefilter.accepts(&at_max));
    }

    #[test]
    fn pipeline_finds_bright_bars_in_order() {
        let mut frame = RgbImage::from_pixel(320, 240, Rgb([10, 20, 10]));
        for (cx, tilt) in [(130.0, 14.5), (190.0, -14.5)] {
            let poly = tilted_bar(cx, 120.0, 12.0, 44.0, tilt);
            imageproc::drawing::draw_polygon_mut(&mut frame, &poly, Rgb([40, 250, 40]));
        }
        let output = FilterPipeline::default().process(&frame).unwrap();
        assert_eq!(output.candidates.len(), 2);
        assert_eq!(output.mask.dimensions(), (320, 240));
    }
}
