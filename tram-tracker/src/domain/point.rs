//! Geographic point types.
//!
//! Everything in this crate works in WGS84 degrees. No range validation is
//! performed: callers are responsible for supplying well-formed coordinates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ParsePointError;

/// A `(latitude, longitude)` pair in degrees.
///
/// Serialises as a two-element array, which is how line geometry is stored
/// in the line catalog.
///
/// # Examples
///
/// ```
/// use tram_tracker::domain::Point;
///
/// let p: Point = serde_json::from_str("[57.7, 11.97]").unwrap();
/// assert_eq!(p, Point::new(57.7, 11.97));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Point {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Rounds both components to 4 decimal places (about 11 m of latitude).
    ///
    /// Used to quantise device positions before memoising per-position
    /// computations, so GPS jitter does not thrash the memo cache.
    pub fn rounded(self) -> Self {
        const PRECISION: f64 = 1e4;
        Self {
            lat: (self.lat * PRECISION).round() / PRECISION,
            lon: (self.lon * PRECISION).round() / PRECISION,
        }
    }

    /// A stable string key at 4 decimal places.
    pub fn cache_key(&self) -> String {
        format!("{:.4},{:.4}", self.lat, self.lon)
    }
}

impl From<(f64, f64)> for Point {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.lat, p.lon)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Parses `"lat,lon"`, ignoring whitespace around either number.
impl FromStr for Point {
    type Err = ParsePointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParsePointError {
            input: s.to_string(),
        };
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
        if !lat.is_finite() || !lon.is_finite() {
            return Err(invalid());
        }
        Ok(Point::new(lat, lon))
    }
}

/// A coordinate object as it appears in journey detail responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Coordinate> for Point {
    fn from(c: Coordinate) -> Self {
        Point::new(c.latitude, c.longitude)
    }
}

/// A single device position update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub point: Point,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(point: Point, timestamp: DateTime<Utc>) -> Self {
        Self { point, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_quantises_to_four_decimals() {
        let p = Point::new(57.708_87, 11.974_56).rounded();
        assert!((p.lat - 57.7089).abs() < 1e-9);
        assert!((p.lon - 11.9746).abs() < 1e-9);
    }

    #[test]
    fn nearby_positions_share_cache_key() {
        let a = Point::new(57.708_871, 11.974_561).rounded();
        let b = Point::new(57.708_874, 11.974_558).rounded();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "57.7089,11.9746");
    }

    #[test]
    fn coordinate_converts_to_point() {
        let c: Coordinate =
            serde_json::from_str(r#"{"latitude": 57.7, "longitude": 11.9}"#).unwrap();
        assert_eq!(Point::from(c), Point::new(57.7, 11.9));
    }

    #[test]
    fn parses_lat_lon_pairs() {
        assert_eq!("57.7, 11.97".parse(), Ok(Point::new(57.7, 11.97)));
        assert_eq!(" -1.5,2 ".parse(), Ok(Point::new(-1.5, 2.0)));
        assert!("57.7".parse::<Point>().is_err());
        assert!("a,b".parse::<Point>().is_err());
        assert!("NaN,1".parse::<Point>().is_err());
    }

    #[test]
    fn point_serialises_as_array() {
        let json = serde_json::to_string(&Point::new(1.5, 2.5)).unwrap();
        assert_eq!(json, "[1.5,2.5]");
    }
}
