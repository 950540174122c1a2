//! Geometry primitives for a single candidate contour.
//!
//! A `VisionTarget` wraps one contour found in a thresholded frame and derives
//! everything the matcher needs from it: area, upright bounding box, minimum
//! area rotated rectangle, moment centroid and the topmost contour row.
//!
//! Rotated rectangles follow the OpenCV 3.x `minAreaRect` convention: the
//! angle lies in `[-90, 0)` degrees and `size.0` is the length of the edge
//! pointing along `(cos a, sin a)`. Corner ordering from `box_points` matches
//! `cv::boxPoints`, which the gap-distance estimate depends on.

use imageproc::point::Point;

/// Upright bounding box in pixel coordinates, inclusive of both edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Minimum-area rectangle: center, (width, height) and rotation in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotatedRect {
    pub center: (f64, f64),
    pub size: (f64, f64),
    pub angle: f64,
}

impl RotatedRect {
    /// Builds the rectangle from four corners given in perimeter order.
    pub fn from_corners(corners: &[(f64, f64); 4]) -> Self {
        let center = (
            corners.iter().map(|c| c.0).sum::<f64>() / 4.0,
            corners.iter().map(|c| c.1).sum::<f64>() / 4.0,
        );
        let edge1 = (corners[1].0 - corners[0].0, corners[1].1 - corners[0].1);
        let edge2 = (corners[2].0 - corners[1].0, corners[2].1 - corners[1].1);
        let len1 = edge1.0.hypot(edge1.1);
        let len2 = edge2.0.hypot(edge2.1);

        // Exactly one of two perpendicular edges has a direction in [-90, 0).
        let angle1 = normalize_half_turn(edge1.1.atan2(edge1.0).to_degrees());
        if angle1 < 0.0 {
            Self {
                center,
                size: (len1, len2),
                angle: angle1,
            }
        } else {
            Self {
                center,
                size: (len2, len1),
                angle: angle1 - 90.0,
            }
        }
    }

    /// Corner points in `cv::boxPoints` order, truncated to integer pixels.
    pub fn box_points(&self) -> [Point<i32>; 4] {
        let radians = self.angle.to_radians();
        let b = radians.cos() * 0.5;
        let a = radians.sin() * 0.5;
        let (cx, cy) = self.center;
        let (w, h) = self.size;

        let p0 = (cx - a * h - b * w, cy + b * h - a * w);
        let p1 = (cx + a * h - b * w, cy - b * h - a * w);
        let p2 = (2.0 * cx - p0.0, 2.0 * cy - p0.1);
        let p3 = (2.0 * cx - p1.0, 2.0 * cy - p1.1);

        [p0, p1, p2, p3].map(|(x, y)| Point::new(truncate(x), truncate(y)))
    }
}

/// Truncates toward zero, snapping values within float noise of an integer.
fn truncate(value: f64) -> i32 {
    let nearest = value.round();
    if (value - nearest).abs() < 1e-6 {
        nearest as i32
    } else {
        value as i32
    }
}

fn normalize_half_turn(mut degrees: f64) -> f64 {
    while degrees >= 90.0 {
        degrees -= 180.0;
    }
    while degrees < -90.0 {
        degrees += 180.0;
    }
    degrees
}

/// Signed tilt of a rectangle from vertical, in degrees.
///
/// Uses the longer of the edges p0-p1 and p1-p2. A shape whose top leans to
/// the right of its base reads positive.
pub fn angle_from_vertical(points: &[Point<i32>; 4]) -> f64 {
    let d01 = distance(points[0], points[1]);
    let d12 = distance(points[1], points[2]);
    let (p1, p2) = if d12 > d01 {
        (points[1], points[2])
    } else {
        (points[0], points[1])
    };

    let x_delta = (p2.x - p1.x).abs() as f64;
    let theta = if x_delta == 0.0 {
        0.0
    } else {
        let y_delta = (p2.y - p1.y).abs() as f64;
        90.0 - (y_delta / x_delta).atan().to_degrees()
    };
    if p1.x > p2.x {
        -theta
    } else {
        theta
    }
}

/// Minimum-area enclosing rectangle of `contour`, corners in perimeter order.
///
/// Rotating calipers over the convex hull: one edge of the optimal rectangle
/// is collinear with a hull edge, so every hull edge direction is tried.
/// Corners stay in floating point; only `RotatedRect::box_points` rounds.
fn min_area_corners(contour: &[Point<i32>]) -> Option<[(f64, f64); 4]> {
    let hull: Vec<(f64, f64)> = imageproc::geometry::convex_hull(contour)
        .iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect();
    let mut best: Option<(f64, [(f64, f64); 4])> = None;
    for (i, a) in hull.iter().enumerate() {
        let b = hull[(i + 1) % hull.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = dx.hypot(dy);
        if len == 0.0 {
            continue;
        }
        let u = (dx / len, dy / len);
        let v = (-u.1, u.0);
        let (mut u_min, mut u_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut v_min, mut v_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let pu = p.0 * u.0 + p.1 * u.1;
            let pv = p.0 * v.0 + p.1 * v.1;
            u_min = u_min.min(pu);
            u_max = u_max.max(pu);
            v_min = v_min.min(pv);
            v_max = v_max.max(pv);
        }
        let area = (u_max - u_min) * (v_max - v_min);
        if best.map_or(true, |(smallest, _)| area < smallest) {
            let corner = |s: f64, t: f64| (s * u.0 + t * v.0, s * u.1 + t * v.1);
            best = Some((
                area,
                [
                    corner(u_min, v_min),
                    corner(u_max, v_min),
                    corner(u_max, v_max),
                    corner(u_min, v_max),
                ],
            ));
        }
    }
    best.map(|(_, corners)| corners)
}

fn distance(a: Point<i32>, b: Point<i32>) -> f64 {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;
    dx.hypot(dy)
}

/// A contour that survived extraction, with its derived geometry.
#[derive(Clone, Debug)]
pub struct VisionTarget {
    contour: Vec<Point<i32>>,
    area: f64,
    bounding_box: BoundingBox,
    rotated_rect: RotatedRect,
    centroid: Point<i32>,
    top_y: i32,
}

impl VisionTarget {
    /// Returns `None` for an empty contour.
    pub fn from_contour(contour: Vec<Point<i32>>) -> Option<Self> {
        let bounding_box = BoundingBox::from_points(&contour)?;
        let moments = PolygonMoments::of(&contour);
        let hull_corners = if moments.m00 == 0.0 {
            None
        } else {
            min_area_corners(&contour)
        };
        // Collinear contours have no hull; fall back to the upright box.
        let corners = hull_corners.unwrap_or_else(|| {
            let (x0, y0) = (bounding_box.x as f64, bounding_box.y as f64);
            let (x1, y1) = (
                (bounding_box.right() - 1) as f64,
                (bounding_box.bottom() - 1) as f64,
            );
            [(x0, y1), (x0, y0), (x1, y0), (x1, y1)]
        });
        let rotated_rect = RotatedRect::from_corners(&corners);
        let top_y = contour.iter().map(|p| p.y).min()?;

        Some(Self {
            area: moments.m00.abs(),
            centroid: moments.centroid(),
            contour,
            bounding_box,
            rotated_rect,
            top_y,
        })
    }

    pub fn contour(&self) -> &[Point<i32>] {
        &self.contour
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn rotated_rect(&self) -> RotatedRect {
        self.rotated_rect
    }

    /// Moment centroid; `(0, 0)` when the contour encloses no area.
    pub fn centroid(&self) -> Point<i32> {
        self.centroid
    }

    pub fn top_y(&self) -> i32 {
        self.top_y
    }

    pub fn box_points(&self) -> [Point<i32>; 4] {
        self.rotated_rect.box_points()
    }

    pub fn angle_from_vertical(&self) -> f64 {
        angle_from_vertical(&self.box_points())
    }

    /// True when the tilt is within `tolerance` of `nominal` degrees.
    pub fn is_potential_left_target(&self, nominal: f64, tolerance: f64) -> bool {
        within(self.angle_from_vertical(), nominal, tolerance)
    }

    /// True when this target tilts opposite to `nominal` and sits to the right
    /// of `left` with some vertical overlap.
    pub fn is_potential_right_target(&self, left: &VisionTarget, nominal: f64, tolerance: f64) -> bool {
        if !within(self.angle_from_vertical(), -nominal, tolerance) {
            return false;
        }
        let l = left.bounding_box;
        let r = self.bounding_box;
        if r.x < l.right() {
            return false;
        }
        if r.y > l.bottom() {
            return false;
        }
        if r.bottom() < l.y {
            return false;
        }
        true
    }
}

fn within(value: f64, nominal: f64, tolerance: f64) -> bool {
    value >= nominal - tolerance && value <= nominal + tolerance
}

/// Spatial moments of a closed polygon (Green's theorem).
struct PolygonMoments {
    m00: f64,
    m10: f64,
    m01: f64,
}

impl PolygonMoments {
    fn of(points: &[Point<i32>]) -> Self {
        let (mut a00, mut a10, mut a01) = (0.0, 0.0, 0.0);
        let Some(last) = points.last() else {
            return Self {
                m00: 0.0,
                m10: 0.0,
                m01: 0.0,
            };
        };
        let (mut xp, mut yp) = (last.x as f64, last.y as f64);
        for p in points {
            let (x, y) = (p.x as f64, p.y as f64);
            let cross = xp * y - x * yp;
            a00 += cross;
            a10 += cross * (xp + x);
            a01 += cross * (yp + y);
            xp = x;
            yp = y;
        }
        Self {
            m00: a00 / 2.0,
            m10: a10 / 6.0,
            m01: a01 / 6.0,
        }
    }

    fn centroid(&self) -> Point<i32> {
        if self.m00 == 0.0 {
            return Point::new(0, 0);
        }
        Point::new((self.m10 / self.m00) as i32, (self.m01 / self.m00) as i32)
    }
}
