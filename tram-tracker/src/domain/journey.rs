//! Journey detail types.
//!
//! A `JourneyDetail` is the full timed, geometric description of one
//! vehicle's trip: its legs, the calls on each leg and the leg geometry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Coordinate, Point, ServiceJourney, StopPoint};

/// A stop call on a trip leg, with planned and realtime times.
///
/// # Time Semantics
///
/// - The first call of a leg normally has only departure times
/// - The last call normally has only arrival times
/// - Estimated times override planned times when available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub stop_point: StopPoint,
    #[serde(default)]
    pub planned_arrival_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub planned_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_arrival_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_otherwise_planned_arrival_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_otherwise_planned_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_cancelled: bool,
}

impl Call {
    /// Creates a call with no times set.
    pub fn new(stop_point: StopPoint) -> Self {
        Self {
            stop_point,
            planned_arrival_time: None,
            planned_departure_time: None,
            estimated_arrival_time: None,
            estimated_departure_time: None,
            estimated_otherwise_planned_arrival_time: None,
            estimated_otherwise_planned_departure_time: None,
            is_cancelled: false,
        }
    }

    /// Best available arrival time (estimated if available, else planned).
    pub fn expected_arrival(&self) -> Option<DateTime<Utc>> {
        self.estimated_otherwise_planned_arrival_time
            .or(self.estimated_arrival_time)
            .or(self.planned_arrival_time)
    }

    /// Best available departure time (estimated if available, else planned).
    pub fn expected_departure(&self) -> Option<DateTime<Utc>> {
        self.estimated_otherwise_planned_departure_time
            .or(self.estimated_departure_time)
            .or(self.planned_departure_time)
    }
}

/// One leg of a journey.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripLeg {
    #[serde(default)]
    pub service_journeys: Vec<ServiceJourney>,
    #[serde(default)]
    pub calls_on_trip_leg: Vec<Call>,
    /// Only present when requested with the `triplegcoordinates` include.
    #[serde(default)]
    pub trip_leg_coordinates: Option<Vec<Coordinate>>,
}

impl TripLeg {
    /// Index of the call at the given stop point, if the leg calls there.
    pub fn call_index(&self, stop_gid: &str) -> Option<usize> {
        self.calls_on_trip_leg
            .iter()
            .position(|c| c.stop_point.gid == stop_gid)
    }

    /// Leg geometry as points, if it was included in the response.
    pub fn polyline(&self) -> Option<Vec<Point>> {
        self.trip_leg_coordinates
            .as_ref()
            .map(|coords| coords.iter().copied().map(Point::from).collect())
    }

    pub fn serves_journey(&self, journey_gid: &str) -> bool {
        self.service_journeys.iter().any(|sj| sj.gid == journey_gid)
    }
}

/// Full detail of a single vehicle journey.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyDetail {
    #[serde(default)]
    pub trip_legs: Vec<TripLeg>,
}

impl JourneyDetail {
    /// Whether any leg belongs to the given service journey.
    pub fn serves_journey(&self, journey_gid: &str) -> bool {
        self.trip_legs.iter().any(|leg| leg.serves_journey(journey_gid))
    }

    /// The last leg that calls at the given stop point.
    pub fn leg_calling_at(&self, stop_gid: &str) -> Option<&TripLeg> {
        self.trip_legs
            .iter()
            .rev()
            .find(|leg| leg.call_index(stop_gid).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(gid: &str) -> StopPoint {
        StopPoint::new(gid, gid, Point::new(0.0, 0.0))
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn expected_times_prefer_estimates() {
        let mut call = Call::new(stop("A"));
        call.planned_arrival_time = Some(at("2026-10-18T10:00:00Z"));
        assert_eq!(call.expected_arrival(), Some(at("2026-10-18T10:00:00Z")));

        call.estimated_arrival_time = Some(at("2026-10-18T10:03:00Z"));
        assert_eq!(call.expected_arrival(), Some(at("2026-10-18T10:03:00Z")));

        assert_eq!(call.expected_departure(), None);
    }

    #[test]
    fn leg_calling_at_picks_last_matching_leg() {
        let leg = |gids: &[&str], journey: &str| TripLeg {
            service_journeys: vec![ServiceJourney {
                gid: journey.into(),
                origin: None,
                direction: None,
                line: Default::default(),
            }],
            calls_on_trip_leg: gids.iter().map(|g| Call::new(stop(g))).collect(),
            trip_leg_coordinates: None,
        };

        let detail = JourneyDetail {
            trip_legs: vec![leg(&["A", "B"], "j1"), leg(&["B", "C"], "j2")],
        };

        let found = detail.leg_calling_at("B").unwrap();
        assert!(found.serves_journey("j2"));
        assert!(detail.leg_calling_at("Z").is_none());
        assert!(detail.serves_journey("j1"));
        assert!(!detail.serves_journey("j3"));
    }

    #[test]
    fn deserialises_journey_detail() {
        let json = r#"{
            "tripLegs": [{
                "serviceJourneys": [{ "gid": "j1", "line": { "transportMode": "tram" } }],
                "callsOnTripLeg": [
                    { "stopPoint": { "gid": "A", "name": "Alpha" },
                      "plannedDepartureTime": "2026-10-18T10:00:00+02:00" },
                    { "stopPoint": { "gid": "B", "name": "Beta" },
                      "plannedArrivalTime": "2026-10-18T10:05:00+02:00",
                      "estimatedArrivalTime": "2026-10-18T10:06:00+02:00" }
                ],
                "tripLegCoordinates": [
                    { "latitude": 57.70, "longitude": 11.95 },
                    { "latitude": 57.71, "longitude": 11.96 }
                ]
            }]
        }"#;

        let detail: JourneyDetail = serde_json::from_str(json).unwrap();
        let leg = &detail.trip_legs[0];
        assert_eq!(leg.call_index("B"), Some(1));
        assert_eq!(leg.polyline().unwrap()[1], Point::new(57.71, 11.96));
        assert_eq!(
            leg.calls_on_trip_leg[1].expected_arrival(),
            Some(at("2026-10-18T08:06:00Z"))
        );
    }
}
