//! Nearby-line resolution.
//!
//! Answers "which stop am I approaching on each line I'm near?". A position
//! is projected onto every line in the catalog; lines further away than the
//! threshold are dropped, and for the rest the first stop on the route ahead
//! of the projected point is chosen.

use std::collections::HashSet;
use std::sync::Arc;

use moka::future::Cache as MokaCache;
use tracing::trace;

use crate::domain::{Line, LineCatalog, Point, StopPoint};
use crate::geometry::{self, DEFAULT_ON_LINE_TOLERANCE_DEG};

/// Configuration for nearby-stop resolution.
#[derive(Debug, Clone)]
pub struct NearbyConfig {
    /// Lines further than this from the position (metres) are ignored.
    pub max_line_distance_m: f64,

    /// How close (degrees) a stop must be to the route ahead to count as on it.
    pub on_line_tolerance_deg: f64,

    /// Maximum number of memoised positions.
    pub memo_capacity: u64,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            max_line_distance_m: 50.0,
            on_line_tolerance_deg: DEFAULT_ON_LINE_TOLERANCE_DEG,
            memo_capacity: 100,
        }
    }
}

impl NearbyConfig {
    /// Set the maximum distance to a line.
    pub fn with_max_line_distance(mut self, metres: f64) -> Self {
        self.max_line_distance_m = metres;
        self
    }
}

/// The next stop ahead on a single line, if the position is near it.
pub fn next_stop_on_line<'a>(
    position: Point,
    line: &'a Line,
    config: &NearbyConfig,
) -> Option<&'a StopPoint> {
    let projection = geometry::closest_point_on_polyline(&line.coordinates, position)?;
    if projection.distance >= config.max_line_distance_m {
        return None;
    }

    let ahead = &line.coordinates[(projection.segment_index + 1).min(line.coordinates.len())..];
    let next = line.stop_points.iter().find(|stop| {
        stop.location().is_some_and(|location| {
            geometry::is_point_on_polyline(location, ahead, config.on_line_tolerance_deg)
        })
    });

    trace!(
        line = line.info.label(),
        distance_m = projection.distance,
        segment = projection.segment_index,
        found_ahead = next.is_some(),
        "Line within range"
    );

    next.or_else(|| line.stop_points.last())
}

/// Find the next stop on each line near `position`.
///
/// Returns one stop per matching line, in catalog order, without duplicates.
/// Lines without stops contribute nothing.
pub fn find_nearby_stops(position: Point, lines: &[Line], config: &NearbyConfig) -> Vec<StopPoint> {
    let mut seen = HashSet::new();
    lines
        .iter()
        .filter_map(|line| next_stop_on_line(position, line, config))
        .filter(|&stop| seen.insert(stop.gid.as_str()))
        .cloned()
        .collect()
}

/// Whether two stop lists name the same stops in the same order.
pub fn same_stops(a: &[StopPoint], b: &[StopPoint]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.gid == y.gid)
}

/// Memoising nearby-stop resolver over a fixed line catalog.
///
/// Positions are rounded to 4 decimal places before lookup, so small GPS
/// jitter hits the same memo entry.
pub struct NearbyStopFinder {
    catalog: LineCatalog,
    config: NearbyConfig,
    memo: MokaCache<String, Arc<Vec<StopPoint>>>,
}

impl NearbyStopFinder {
    pub fn new(catalog: LineCatalog, config: NearbyConfig) -> Self {
        let memo = MokaCache::builder()
            .max_capacity(config.memo_capacity)
            .build();
        Self {
            catalog,
            config,
            memo,
        }
    }

    /// Nearby stops for a position, memoised on the rounded coordinates.
    pub async fn find(&self, position: Point) -> Arc<Vec<StopPoint>> {
        let rounded = position.rounded();
        self.memo
            .get_with(rounded.cache_key(), async {
                Arc::new(find_nearby_stops(
                    rounded,
                    self.catalog.lines(),
                    &self.config,
                ))
            })
            .await
    }

    pub fn catalog(&self) -> &LineCatalog {
        &self.catalog
    }

    /// Number of memoised positions (approximate, for monitoring).
    pub fn memo_size(&self) -> u64 {
        self.memo.entry_count()
    }
}
