//! Stop types.

use serde::{Deserialize, Serialize};

use super::Point;

/// A stop area: the group of platforms that share a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopArea {
    pub gid: Option<String>,
    pub name: Option<String>,
    pub lat: f64,
    pub long: f64,
}

impl StopArea {
    pub fn location(&self) -> Point {
        Point::new(self.lat, self.long)
    }
}

/// A physical stop point (a single platform) with a fixed location.
///
/// Upstream responses occasionally omit coordinates, so the location is
/// optional. Stop points in the line catalog always carry one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPoint {
    /// Globally unique stop point identifier.
    pub gid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_area: Option<StopArea>,
}

impl StopPoint {
    /// Creates a stop point at a known location.
    pub fn new(gid: impl Into<String>, name: impl Into<String>, location: Point) -> Self {
        Self {
            gid: gid.into(),
            name: name.into(),
            platform: None,
            latitude: Some(location.lat),
            longitude: Some(location.lon),
            stop_area: None,
        }
    }

    /// Returns the stop's location, if both coordinates are known.
    pub fn location(&self) -> Option<Point> {
        Some(Point::new(self.latitude?, self.longitude?))
    }
}
