//! Lines and the read-only line catalog.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::CatalogError;
use super::{Point, StopPoint};

/// Mode of transport for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Tram,
    Bus,
    Ferry,
    Train,
    Taxi,
    Walk,
    Bike,
    Car,
    Teletaxi,
    None,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Line identity and presentation metadata as published upstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInfo {
    #[serde(default)]
    pub gid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub transport_mode: TransportMode,
}

impl LineInfo {
    /// The most specific human-readable label available.
    pub fn label(&self) -> &str {
        self.designation
            .as_deref()
            .or(self.short_name.as_deref())
            .or(self.name.as_deref())
            .unwrap_or("?")
    }
}

/// A transit line: identity, route geometry and stops in travel order.
///
/// Stops are expected to be monotonic along `coordinates`; nothing checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    #[serde(flatten)]
    pub info: LineInfo,
    pub coordinates: Vec<Point>,
    pub stop_points: Vec<StopPoint>,
}

/// Immutable set of known lines, shared across resolver calls.
#[derive(Debug, Clone, Default)]
pub struct LineCatalog {
    lines: Arc<[Line]>,
}

impl LineCatalog {
    pub fn new(lines: Vec<Line>) -> Self {
        Self {
            lines: lines.into(),
        }
    }

    /// Parse a catalog from a JSON array of lines.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let lines: Vec<Line> = serde_json::from_str(json)?;
        Ok(Self::new(lines))
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
