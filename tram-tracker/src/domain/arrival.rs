//! Live arrival and departure candidates.
//!
//! These are produced fresh on every upstream fetch and are never mutated;
//! a refresh replaces the whole list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LineInfo, StopPoint, TransportMode};

/// The vehicle trip an arrival or departure belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceJourney {
    pub gid: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub line: LineInfo,
}

/// A live prediction of a vehicle arriving at a stop point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrival {
    /// Opaque token used to fetch the full journey detail.
    #[serde(default)]
    pub details_reference: Option<String>,
    pub service_journey: ServiceJourney,
    pub stop_point: StopPoint,
    pub planned_time: DateTime<Utc>,
    #[serde(default)]
    pub estimated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_otherwise_planned_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(default)]
    pub is_part_cancelled: bool,
}

impl Arrival {
    /// Best known arrival time: the estimate if there is one, else the plan.
    pub fn expected_time(&self) -> DateTime<Utc> {
        self.estimated_otherwise_planned_time
            .or(self.estimated_time)
            .unwrap_or(self.planned_time)
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.service_journey.line.transport_mode
    }

    pub fn is_tram(&self) -> bool {
        self.transport_mode() == TransportMode::Tram
    }
}

/// Occupancy estimate attached to some departures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    pub level: String,
    pub source: String,
}

/// A live prediction of a vehicle departing from a stop point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    #[serde(default)]
    pub details_reference: Option<String>,
    pub service_journey: ServiceJourney,
    pub stop_point: StopPoint,
    pub planned_time: DateTime<Utc>,
    #[serde(default)]
    pub estimated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_otherwise_planned_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(default)]
    pub is_part_cancelled: bool,
    #[serde(default)]
    pub occupancy: Option<Occupancy>,
}

impl Departure {
    pub fn expected_time(&self) -> DateTime<Utc> {
        self.estimated_otherwise_planned_time
            .or(self.estimated_time)
            .unwrap_or(self.planned_time)
    }
}
