//! Geometry kernel.
//!
//! Pure functions over WGS84 points: great-circle distance, nearest points on
//! segments and polylines, and polyline length.
//!
//! Projections onto segments are done in a local equirectangular frame centred
//! on the segment midpoint, which is accurate at tram-line scale. Distances
//! are always measured with the haversine formula afterwards; the planar
//! distance is never reported.

use crate::domain::Point;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Metres per degree of latitude in the local projection.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Segments shorter than this are treated as a pair of points.
const MIN_SEGMENT_M: f64 = 1.0;

/// Default tolerance for [`is_point_on_polyline`], in degrees.
pub const DEFAULT_ON_LINE_TOLERANCE_DEG: f64 = 0.0001;

/// The point on a polyline nearest to some target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub point: Point,
    /// Great-circle distance from the target to `point`, in metres.
    pub distance: f64,
    /// Index of the segment (`polyline[i]..polyline[i + 1]`) containing `point`.
    pub segment_index: usize,
}

/// Great-circle distance between two points in metres.
pub fn distance(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h slightly past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Closest point to `target` on the segment `start..end`, treating degrees as
/// planar coordinates.
///
/// The projection parameter is clamped to the segment. A degenerate segment
/// returns `start`.
pub fn closest_point_on_segment(start: Point, end: Point, target: Point) -> Point {
    let (lat, lon) = project_planar(
        (start.lat, start.lon),
        (end.lat, end.lon),
        (target.lat, target.lon),
    );
    Point::new(lat, lon)
}

/// Closest point to `target` on a polyline.
///
/// Returns `None` for an empty polyline. A single-point polyline yields that
/// point with segment index 0. Ties go to the earliest segment.
pub fn closest_point_on_polyline(polyline: &[Point], target: Point) -> Option<ClosestPoint> {
    match polyline {
        [] => None,
        [only] => Some(ClosestPoint {
            point: *only,
            distance: distance(*only, target),
            segment_index: 0,
        }),
        _ => {
            let mut best: Option<ClosestPoint> = None;
            for (i, pair) in polyline.windows(2).enumerate() {
                let projected = closest_point_on_segment_local(pair[0], pair[1], target);
                // The endpoints are checked too, so projection error can never
                // leave the answer further away than a vertex.
                for point in [projected, pair[0], pair[1]] {
                    let candidate = ClosestPoint {
                        point,
                        distance: distance(point, target),
                        segment_index: i,
                    };
                    if best.is_none_or(|b| candidate.distance < b.distance) {
                        best = Some(candidate);
                    }
                }
            }
            best
        }
    }
}

/// Total length of a polyline in metres. Zero for fewer than two points.
pub fn polyline_length(polyline: &[Point]) -> f64 {
    polyline.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Great-circle distance from `p` to the segment `a..b`, in metres.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    distance(p, closest_point_on_segment_local(a, b, p))
}

/// Whether `point` lies on the polyline within `tolerance_deg` degrees.
///
/// Each segment's bounding box, grown by the tolerance, is checked first; the
/// true distance must then be within the tolerance converted to metres.
pub fn is_point_on_polyline(point: Point, polyline: &[Point], tolerance_deg: f64) -> bool {
    let tolerance_m = tolerance_deg * METRES_PER_DEGREE;
    polyline.windows(2).any(|w| {
        in_bounding_box(point, w[0], w[1], tolerance_deg)
            && distance_to_segment(point, w[0], w[1]) <= tolerance_m
    })
}

fn in_bounding_box(p: Point, a: Point, b: Point, tolerance: f64) -> bool {
    let (min_lat, max_lat) = (a.lat.min(b.lat) - tolerance, a.lat.max(b.lat) + tolerance);
    let (min_lon, max_lon) = (a.lon.min(b.lon) - tolerance, a.lon.max(b.lon) + tolerance);
    (min_lat..=max_lat).contains(&p.lat) && (min_lon..=max_lon).contains(&p.lon)
}

/// Closest point on `a..b` using a local equirectangular frame around the
/// segment midpoint.
fn closest_point_on_segment_local(a: Point, b: Point, target: Point) -> Point {
    if distance(a, b) < MIN_SEGMENT_M {
        return if distance(target, a) <= distance(target, b) {
            a
        } else {
            b
        };
    }

    let origin = Point::new((a.lat + b.lat) / 2.0, (a.lon + b.lon) / 2.0);
    let frame = LocalFrame::new(origin);
    let closest = project_planar(frame.to_local(a), frame.to_local(b), frame.to_local(target));
    frame.to_geo(closest)
}

/// Clamped orthogonal projection of `p` onto `a..b` in the plane.
fn project_planar(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> (f64, f64) {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return a;
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0);
    (a.0 + t * dx, a.1 + t * dy)
}

/// Equirectangular projection around an origin, in metres.
struct LocalFrame {
    origin: Point,
    lon_scale: f64,
}

impl LocalFrame {
    fn new(origin: Point) -> Self {
        Self {
            origin,
            lon_scale: METRES_PER_DEGREE * origin.lat.to_radians().cos(),
        }
    }

    fn to_local(&self, p: Point) -> (f64, f64) {
        (
            (p.lat - self.origin.lat) * METRES_PER_DEGREE,
            (p.lon - self.origin.lon) * self.lon_scale,
        )
    }

    fn to_geo(&self, (y, x): (f64, f64)) -> Point {
        Point::new(
            self.origin.lat + y / METRES_PER_DEGREE,
            self.origin.lon + x / self.lon_scale,
        )
    }
}
