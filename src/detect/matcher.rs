//! Pairs candidate contours into a left/right target and back-projects
//! heading and range from the camera geometry.

use serde::Deserialize;

use super::target::VisionTarget;

/// Camera field of view and physical target dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub fov_width_deg: f64,
    pub fov_height_deg: f64,
    pub target_gap_in: f64,
    pub camera_height_in: f64,
    pub target_height_standard_in: f64,
    pub target_height_rocket_in: f64,
    /// Nominal tilt of the left strip from vertical; the right strip is the mirror.
    pub target_angle_deg: f64,
    pub angle_tolerance_deg: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            fov_width_deg: 61.179,
            fov_height_deg: 43.3,
            target_gap_in: 8.0,
            camera_height_in: 50.2,
            target_height_standard_in: 31.5,
            target_height_rocket_in: 39.125,
            target_angle_deg: 14.5,
            angle_tolerance_deg: 10.0,
        }
    }
}

/// How to choose among several valid pairs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSelection {
    /// First pair in combination order.
    First,
    /// Largest combined contour area; ties keep the earlier pair.
    #[default]
    LargestArea,
    /// Smallest total deviation from the nominal strip angles.
    SmallestAngleError,
}

#[derive(Clone, Debug)]
pub struct TargetPair {
    pub left: VisionTarget,
    pub right: VisionTarget,
    pub center_x: i32,
    pub top_y: i32,
    /// Degrees off the optical axis, negative to the left.
    pub heading: f64,
    pub distance_from_gap: f64,
    pub distance_from_vertical_standard: f64,
    pub distance_from_vertical_rocket: f64,
}

/// Outcome of matching one frame. Fields only exist when a pair was found.
#[derive(Clone, Debug, Default)]
pub struct TargetReport {
    pub pair: Option<TargetPair>,
}

impl TargetReport {
    pub fn none() -> Self {
        Self { pair: None }
    }

    pub fn success(&self) -> bool {
        self.pair.is_some()
    }

    pub fn log_summary(&self) {
        match &self.pair {
            Some(pair) => log::debug!(
                "target pair: left={:?} right={:?} center_x={} top_y={} heading={:.3} gap_dist={:.3} rocket_dist={:.3} standard_dist={:.3}",
                pair.left.bounding_box(),
                pair.right.bounding_box(),
                pair.center_x,
                pair.top_y,
                pair.heading,
                pair.distance_from_gap,
                pair.distance_from_vertical_rocket,
                pair.distance_from_vertical_standard,
            ),
            None => log::trace!("no target pair"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TargetMatcher {
    calibration: Calibration,
    selection: PairSelection,
}

impl TargetMatcher {
    pub fn new(calibration: Calibration, selection: PairSelection) -> Self {
        Self {
            calibration,
            selection,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn find(&self, candidates: &[VisionTarget], width: u32, height: u32) -> TargetReport {
        let pairs = self.valid_pairs(candidates);
        let Some((left, right)) = self.select(&pairs) else {
            return TargetReport::none();
        };

        let cal = &self.calibration;
        let center_x = (left.centroid().x + right.centroid().x) / 2;
        let top_y = left.top_y().min(right.top_y());
        let pair = TargetPair {
            center_x,
            top_y,
            heading: heading_degrees(center_x, width, cal.fov_width_deg),
            distance_from_gap: distance_from_gap(left, right, width, cal),
            distance_from_vertical_standard: distance_from_vertical(
                top_y,
                height,
                cal.target_height_standard_in,
                cal,
            ),
            distance_from_vertical_rocket: distance_from_vertical(
                top_y,
                height,
                cal.target_height_rocket_in,
                cal,
            ),
            left: left.clone(),
            right: right.clone(),
        };
        TargetReport { pair: Some(pair) }
    }

    /// Every (left, right) pair in combination order; for each unordered pair
    /// the (i, j) orientation is tried before (j, i).
    fn valid_pairs<'a>(&self, candidates: &'a [VisionTarget]) -> Vec<(&'a VisionTarget, &'a VisionTarget)> {
        let mut pairs = Vec::new();
        for (i, one) in candidates.iter().enumerate() {
            for two in &candidates[i + 1..] {
                if self.is_match(one, two) {
                    pairs.push((one, two));
                } else if self.is_match(two, one) {
                    pairs.push((two, one));
                }
            }
        }
        pairs
    }

    fn is_match(&self, left: &VisionTarget, right: &VisionTarget) -> bool {
        let nominal = self.calibration.target_angle_deg;
        let tolerance = self.calibration.angle_tolerance_deg;
        left.is_potential_left_target(nominal, tolerance)
            && right.is_potential_right_target(left, nominal, tolerance)
    }

    fn select<'a>(
        &self,
        pairs: &[(&'a VisionTarget, &'a VisionTarget)],
    ) -> Option<(&'a VisionTarget, &'a VisionTarget)> {
        let nominal = self.calibration.target_angle_deg;
        let mut best: Option<(f64, (&VisionTarget, &VisionTarget))> = None;
        for &(left, right) in pairs {
            let score = match self.selection {
                PairSelection::First => return Some((left, right)),
                PairSelection::LargestArea => left.area() + right.area(),
                PairSelection::SmallestAngleError => {
                    -((left.angle_from_vertical() - nominal).abs()
                        + (right.angle_from_vertical() + nominal).abs())
                }
            };
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, (left, right)));
            }
        }
        best.map(|(_, pair)| pair)
    }
}

/// Bearing of pixel column `center_x`; exactly 0.0 on the image centre line.
pub fn heading_degrees(center_x: i32, width: u32, fov_width_deg: f64) -> f64 {
    let mid = width as f64 / 2.0;
    let x = center_x as f64;
    if x == mid {
        return 0.0;
    }
    let heading = fov_width_deg * (mid - x).abs() / width as f64;
    if x < mid {
        -heading
    } else {
        heading
    }
}

/// Range from the angular width of the gap between the strips' inner top corners.
fn distance_from_gap(left: &VisionTarget, right: &VisionTarget, width: u32, cal: &Calibration) -> f64 {
    let inner_left = left.box_points()[3];
    let inner_right = right.box_points()[1];
    let gap_px = (inner_right.x - inner_left.x) as f64;
    let theta = cal.fov_width_deg * gap_px / width as f64;
    (cal.target_gap_in / 2.0) / (theta / 2.0).to_radians().tan()
}

/// Range from the elevation of the target's top edge. Infinite when the top
/// edge sits on the horizontal centre line.
fn distance_from_vertical(top_y: i32, height: u32, target_height_in: f64, cal: &Calibration) -> f64 {
    let offset_px = height as f64 / 2.0 - top_y as f64;
    let angle = offset_px * cal.fov_height_deg / height as f64;
    let rise = (cal.camera_height_in - target_height_in).abs();
    log::debug!("pixel offset {offset_px}, vertical angle {angle:.3}, height delta {rise}");
    (rise / angle.to_radians().tan()).abs()
}
