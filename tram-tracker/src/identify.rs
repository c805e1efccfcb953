//! Tram identification logic.
//!
//! This module contains the core logic for identifying which approaching
//! tram the user is on, given their live position and the live arrivals at
//! the stop they are heading towards.
//!
//! For each candidate arrival we ask: if the rider were on this vehicle, where
//! along the route between the previous stop and the target stop should it be
//! right now? The route geometry gives the rider's progress between the two
//! stops, the timetable gives the time at which the vehicle should be at that
//! progress, and the score is how far that time is from now.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Arrival, JourneyDetail, Point};
use crate::geometry;

/// How well a candidate explains the rider's position.
///
/// Ordered best first: any matched score sorts before `Inapplicable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Score {
    /// Absolute difference between now and the expected time at the rider's
    /// position, in milliseconds. Lower is better.
    Millis(u64),
    /// The candidate cannot be evaluated against this stop.
    Inapplicable,
}

impl Score {
    /// The error in milliseconds, if the candidate could be evaluated.
    pub fn millis(self) -> Option<u64> {
        match self {
            Score::Millis(ms) => Some(ms),
            Score::Inapplicable => None,
        }
    }

    /// The error as a float, with `Inapplicable` as infinity.
    pub fn as_f64(self) -> f64 {
        self.millis().map_or(f64::INFINITY, |ms| ms as f64)
    }
}

/// The upstream data for a candidate contradicts itself.
///
/// Distinct from [`Score::Inapplicable`]: these mean the arrival list and the
/// journey detail disagree, which is worth surfacing rather than ranking last.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    /// The journey has legs but none of them calls at the arrival's stop
    #[error("stop {stop_gid} not found in journey calls")]
    StopNotInJourney { stop_gid: String },

    /// The call before the target has no departure time at all
    #[error("previous stop {stop_gid} has no estimated or planned departure time")]
    MissingDeparture { stop_gid: String },

    /// The target call has no arrival time at all
    #[error("stop {stop_gid} has no estimated or planned arrival time")]
    MissingArrival { stop_gid: String },
}

/// Score one candidate arrival against the rider's position at `now`.
pub fn score_journey(
    journey: &JourneyDetail,
    arrival: &Arrival,
    position: Point,
    now: DateTime<Utc>,
) -> Result<Score, ScoreError> {
    let stop_gid = arrival.stop_point.gid.as_str();

    if journey.trip_legs.is_empty() {
        return Ok(Score::Inapplicable);
    }
    let leg = journey
        .leg_calling_at(stop_gid)
        .ok_or_else(|| ScoreError::StopNotInJourney {
            stop_gid: stop_gid.to_string(),
        })?;
    let Some(target_idx) = leg.call_index(stop_gid) else {
        return Ok(Score::Inapplicable);
    };
    let Some(prev_idx) = target_idx.checked_sub(1) else {
        return Ok(Score::Inapplicable);
    };
    let prev_call = &leg.calls_on_trip_leg[prev_idx];
    let target_call = &leg.calls_on_trip_leg[target_idx];

    let Some(coordinates) = leg.polyline().filter(|c| !c.is_empty()) else {
        return Ok(Score::Inapplicable);
    };
    let Some(prev_location) = prev_call.stop_point.location() else {
        return Ok(Score::Inapplicable);
    };
    let Some(target_location) = arrival
        .stop_point
        .location()
        .or_else(|| target_call.stop_point.location())
    else {
        return Ok(Score::Inapplicable);
    };

    let Some(progress) = progress_between(&coordinates, prev_location, target_location, position)
    else {
        return Ok(Score::Inapplicable);
    };

    let departure = prev_call
        .expected_departure()
        .ok_or_else(|| ScoreError::MissingDeparture {
            stop_gid: prev_call.stop_point.gid.clone(),
        })?;
    let arrival_time = target_call
        .expected_arrival()
        .ok_or_else(|| ScoreError::MissingArrival {
            stop_gid: stop_gid.to_string(),
        })?;

    Ok(Score::Millis(time_error_ms(
        departure,
        arrival_time,
        progress,
        now,
    )))
}

/// Fraction in `[0, 1]` of the way the rider is from the previous stop to the
/// target stop along `route`.
///
/// The section runs from the vertex after the previous stop's segment up to the
/// target's projected point. A zero-length section gives progress 0.
pub fn progress_between(
    route: &[Point],
    prev_stop: Point,
    target_stop: Point,
    rider: Point,
) -> Option<f64> {
    let prev = geometry::closest_point_on_polyline(route, prev_stop)?;
    let target = geometry::closest_point_on_polyline(route, target_stop)?;

    let mut section: Vec<Point> = route
        .get(prev.segment_index + 1..target.segment_index + 1)
        .unwrap_or_default()
        .to_vec();
    section.push(target.point);

    let current = geometry::closest_point_on_polyline(&section, rider)?;
    let mut travelled: Vec<Point> = section[..=current.segment_index].to_vec();
    travelled.push(current.point);

    let total = geometry::polyline_length(&section);
    if total <= 0.0 {
        return Some(0.0);
    }
    Some((geometry::polyline_length(&travelled) / total).clamp(0.0, 1.0))
}

/// `|now - (departure + progress * (arrival - departure))|` in milliseconds.
fn time_error_ms(
    departure: DateTime<Utc>,
    arrival: DateTime<Utc>,
    progress: f64,
    now: DateTime<Utc>,
) -> u64 {
    let span_ms = (arrival - departure).num_milliseconds() as f64;
    let expected = departure + Duration::milliseconds((progress * span_ms).round() as i64);
    (now - expected).num_milliseconds().unsigned_abs()
}

/// A live arrival paired with the journey detail that explains it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub arrival: Arrival,
    pub journey: Arc<JourneyDetail>,
}

/// A candidate with its scoring outcome.
#[derive(Debug, Clone)]
pub struct ScoredArrival {
    pub arrival: Arrival,
    pub outcome: Result<Score, ScoreError>,
}

impl ScoredArrival {
    /// The score used for ranking. Faulty candidates rank with the
    /// inapplicable ones.
    pub fn score(&self) -> Score {
        self.outcome.clone().unwrap_or(Score::Inapplicable)
    }

    /// The data-consistency fault, if any.
    pub fn fault(&self) -> Option<&ScoreError> {
        self.outcome.as_ref().err()
    }
}

/// Score and rank candidates, best first.
///
/// Nothing is discarded: inapplicable and faulty candidates sort last, and the
/// caller decides which scores are good enough.
pub fn score_candidates(
    position: Point,
    now: DateTime<Utc>,
    candidates: &[Candidate],
) -> Vec<ScoredArrival> {
    let mut scored: Vec<ScoredArrival> = candidates
        .iter()
        .map(|c| ScoredArrival {
            arrival: c.arrival.clone(),
            outcome: score_journey(&c.journey, &c.arrival, position, now),
        })
        .collect();

    scored.sort_by_key(ScoredArrival::score);
    scored
}

/// Tram arrivals that can be looked up in detail, one per details reference.
pub fn select_tram_arrivals<'a>(arrivals: impl IntoIterator<Item = &'a Arrival>) -> Vec<Arrival> {
    let mut seen = HashSet::new();
    arrivals
        .into_iter()
        .filter(|a| a.is_tram())
        .filter(|a| {
            a.details_reference
                .as_deref()
                .is_some_and(|r| seen.insert(r.to_string()))
        })
        .cloned()
        .collect()
}

/// Pair each arrival with the first journey detail that serves its service
/// journey. Arrivals without a matching detail are dropped.
pub fn pair_with_journeys(
    arrivals: &[Arrival],
    journeys: &[Arc<JourneyDetail>],
) -> Vec<Candidate> {
    arrivals
        .iter()
        .filter_map(|arrival| {
            let journey = journeys
                .iter()
                .find(|j| j.serves_journey(&arrival.service_journey.gid))?;
            Some(Candidate {
                arrival: arrival.clone(),
                journey: Arc::clone(journey),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Call, Coordinate, LineInfo, ServiceJourney, StopPoint, TransportMode, TripLeg,
    };

    fn p(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    fn t0() -> DateTime<Utc> {
        "2026-10-18T10:00:00Z".parse().unwrap()
    }

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    fn stop(gid: &str, at: Point) -> StopPoint {
        StopPoint::new(gid, gid.to_uppercase(), at)
    }

    fn tram_journey(gid: &str) -> ServiceJourney {
        ServiceJourney {
            gid: gid.into(),
            origin: None,
            direction: Some("Östra Sjukhuset".into()),
            line: LineInfo {
                short_name: Some("3".into()),
                transport_mode: TransportMode::Tram,
                ..Default::default()
            },
        }
    }

    /// A straight route along the equator with stops at every vertex.
    ///
    /// Stop `i` is at longitude `0.01 * i`; the vehicle departs stop `i` at
    /// `t0 + 10 min * (i - 1)` and arrives at `t0 + 10 min * i`.
    fn mock_journey(journey_gid: &str, stops: &[&str]) -> JourneyDetail {
        let calls = stops
            .iter()
            .enumerate()
            .map(|(i, gid)| {
                let mut call = Call::new(stop(gid, p(0.0, 0.01 * i as f64)));
                let i = i as i64;
                if i > 0 {
                    call.planned_arrival_time = Some(t0() + ms(600_000 * (i - 1)));
                }
                if i + 1 < stops.len() as i64 {
                    call.planned_departure_time = Some(t0() + ms(600_000 * (i - 1)));
                }
                call
            })
            .collect();

        let coordinates = (0..stops.len())
            .map(|i| Coordinate {
                latitude: 0.0,
                longitude: 0.01 * i as f64,
            })
            .collect();

        JourneyDetail {
            trip_legs: vec![TripLeg {
                service_journeys: vec![tram_journey(journey_gid)],
                calls_on_trip_leg: calls,
                trip_leg_coordinates: Some(coordinates),
            }],
        }
    }

    fn mock_arrival(journey_gid: &str, reference: &str, stop_gid: &str, at: Point) -> Arrival {
        Arrival {
            details_reference: Some(reference.into()),
            service_journey: tram_journey(journey_gid),
            stop_point: stop(stop_gid, at),
            planned_time: t0(),
            estimated_time: None,
            estimated_otherwise_planned_time: None,
            is_cancelled: false,
            is_part_cancelled: false,
        }
    }

    /// Route a-b-c-d; the rider is heading for c, halfway between b and c.
    /// The vehicle leaves b at t0 and reaches c at t0 + 10 min.
    fn halfway_scenario() -> (JourneyDetail, Arrival, Point) {
        let journey = mock_journey("j1", &["a", "b", "c", "d"]);
        let arrival = mock_arrival("j1", "ref1", "c", p(0.0, 0.02));
        (journey, arrival, p(0.0001, 0.015))
    }

    #[test]
    fn perfect_match_scores_zero() {
        let (journey, arrival, rider) = halfway_scenario();
        let score = score_journey(&journey, &arrival, rider, t0() + ms(300_000)).unwrap();
        assert_eq!(score, Score::Millis(0));
    }

    #[test]
    fn early_clock_scores_difference() {
        let (journey, arrival, rider) = halfway_scenario();
        let score = score_journey(&journey, &arrival, rider, t0() + ms(250_000)).unwrap();
        assert_eq!(score, Score::Millis(50_000));

        let late = score_journey(&journey, &arrival, rider, t0() + ms(360_000)).unwrap();
        assert_eq!(late, Score::Millis(60_000));
    }

    #[test]
    fn estimated_times_override_planned() {
        let (mut journey, arrival, rider) = halfway_scenario();
        let calls = &mut journey.trip_legs[0].calls_on_trip_leg;
        // Running two minutes late out of b and into c.
        calls[1].estimated_departure_time = Some(t0() + ms(120_000));
        calls[2].estimated_arrival_time = Some(t0() + ms(720_000));

        let score = score_journey(&journey, &arrival, rider, t0() + ms(420_000)).unwrap();
        assert_eq!(score, Score::Millis(0));
    }

    #[test]
    fn first_stop_is_inapplicable() {
        let journey = mock_journey("j1", &["a", "b", "c"]);
        let arrival = mock_arrival("j1", "ref1", "a", p(0.0, 0.0));
        let score = score_journey(&journey, &arrival, p(0.0, 0.005), t0()).unwrap();
        assert_eq!(score, Score::Inapplicable);
    }

    #[test]
    fn journey_without_legs_is_inapplicable() {
        let arrival = mock_arrival("j1", "ref1", "c", p(0.0, 0.02));
        let score = score_journey(&JourneyDetail::default(), &arrival, p(0.0, 0.0), t0()).unwrap();
        assert_eq!(score, Score::Inapplicable);
    }

    #[test]
    fn missing_coordinates_are_inapplicable() {
        let (mut journey, arrival, rider) = halfway_scenario();
        journey.trip_legs[0].trip_leg_coordinates = None;
        assert_eq!(
            score_journey(&journey, &arrival, rider, t0()).unwrap(),
            Score::Inapplicable
        );

        journey.trip_legs[0].trip_leg_coordinates = Some(vec![]);
        assert_eq!(
            score_journey(&journey, &arrival, rider, t0()).unwrap(),
            Score::Inapplicable
        );
    }

    #[test]
    fn stop_absent_from_journey_is_a_fault() {
        let (journey, _, rider) = halfway_scenario();
        let arrival = mock_arrival("j1", "ref1", "zzz", p(0.0, 0.02));
        let err = score_journey(&journey, &arrival, rider, t0()).unwrap_err();
        assert_eq!(
            err,
            ScoreError::StopNotInJourney {
                stop_gid: "zzz".into()
            }
        );
    }

    #[test]
    fn missing_times_are_faults() {
        let (mut journey, arrival, rider) = halfway_scenario();
        journey.trip_legs[0].calls_on_trip_leg[1].planned_departure_time = None;
        let err = score_journey(&journey, &arrival, rider, t0()).unwrap_err();
        assert!(matches!(err, ScoreError::MissingDeparture { ref stop_gid } if stop_gid == "b"));

        let (mut journey, arrival, rider) = halfway_scenario();
        journey.trip_legs[0].calls_on_trip_leg[2].planned_arrival_time = None;
        let err = score_journey(&journey, &arrival, rider, t0()).unwrap_err();
        assert!(matches!(err, ScoreError::MissingArrival { ref stop_gid } if stop_gid == "c"));
    }

    #[test]
    fn progress_is_clamped_outside_section() {
        let route = [p(0.0, 0.0), p(0.0, 0.01), p(0.0, 0.02), p(0.0, 0.03)];
        // Rider already past the target.
        let past = progress_between(&route, p(0.0, 0.01), p(0.0, 0.02), p(0.0, 0.03)).unwrap();
        assert!((past - 1.0).abs() < 1e-9);
        // Rider behind the previous stop.
        let behind = progress_between(&route, p(0.0, 0.01), p(0.0, 0.02), p(0.0, 0.0)).unwrap();
        assert!(behind.abs() < 1e-9);
    }

    #[test]
    fn zero_length_section_has_zero_progress() {
        let route = [p(0.0, 0.0)];
        assert_eq!(
            progress_between(&route, p(0.0, 0.0), p(0.0, 0.0), p(1.0, 1.0)),
            Some(0.0)
        );
        assert_eq!(progress_between(&[], p(0.0, 0.0), p(0.0, 0.0), p(0.0, 0.0)), None);
    }

    #[test]
    fn candidates_ranked_best_first() {
        let rider = p(0.0001, 0.015);
        let now = t0() + ms(300_000);

        // On time, so a perfect match.
        let good = Candidate {
            arrival: mock_arrival("j1", "ref1", "c", p(0.0, 0.02)),
            journey: Arc::new(mock_journey("j1", &["a", "b", "c", "d"])),
        };
        // Same route five minutes later: leaves b at t0 + 5 min.
        let mut later = mock_journey("j2", &["a", "b", "c", "d"]);
        for call in &mut later.trip_legs[0].calls_on_trip_leg {
            call.planned_arrival_time = call.planned_arrival_time.map(|t| t + ms(300_000));
            call.planned_departure_time = call.planned_departure_time.map(|t| t + ms(300_000));
        }
        let worse = Candidate {
            arrival: mock_arrival("j2", "ref2", "c", p(0.0, 0.02)),
            journey: Arc::new(later),
        };
        // Starts at c, so it cannot be evaluated.
        let useless = Candidate {
            arrival: mock_arrival("j3", "ref3", "c", p(0.0, 0.02)),
            journey: Arc::new(mock_journey("j3", &["c", "d"])),
        };

        let ranked = score_candidates(rider, now, &[useless, worse, good]);

        let refs: Vec<_> = ranked
            .iter()
            .map(|s| s.arrival.details_reference.as_deref().unwrap())
            .collect();
        assert_eq!(refs, ["ref1", "ref2", "ref3"]);
        assert_eq!(ranked[0].score(), Score::Millis(0));
        assert_eq!(ranked[1].score(), Score::Millis(300_000));
        assert_eq!(ranked[2].score(), Score::Inapplicable);
        assert!(ranked.iter().all(|s| s.fault().is_none()));
    }

    #[test]
    fn faulty_candidates_are_kept_and_ranked_last() {
        let candidate = Candidate {
            arrival: mock_arrival("j1", "ref1", "zzz", p(0.0, 0.02)),
            journey: Arc::new(mock_journey("j1", &["a", "b"])),
        };
        let ranked = score_candidates(p(0.0, 0.0), t0(), &[candidate]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score(), Score::Inapplicable);
        assert!(ranked[0].fault().is_some());
    }

    #[test]
    fn score_ordering() {
        assert!(Score::Millis(u64::MAX) < Score::Inapplicable);
        assert!(Score::Millis(1) < Score::Millis(2));
        assert_eq!(Score::Inapplicable.as_f64(), f64::INFINITY);
        assert_eq!(Score::Millis(5).millis(), Some(5));
    }

    #[test]
    fn select_keeps_one_tram_per_reference() {
        let a = mock_arrival("j1", "ref1", "c", p(0.0, 0.0));
        let dup = mock_arrival("j1", "ref1", "d", p(0.0, 0.0));
        let mut bus = mock_arrival("j2", "ref2", "c", p(0.0, 0.0));
        bus.service_journey.line.transport_mode = TransportMode::Bus;
        let mut unreferenced = mock_arrival("j3", "ref3", "c", p(0.0, 0.0));
        unreferenced.details_reference = None;

        let selected = select_tram_arrivals(&[a, dup, bus, unreferenced]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].stop_point.gid, "c");
    }

    #[test]
    fn pairs_arrivals_by_service_journey() {
        let arrivals = vec![
            mock_arrival("j1", "ref1", "c", p(0.0, 0.0)),
            mock_arrival("j2", "ref2", "c", p(0.0, 0.0)),
        ];
        let journeys = vec![Arc::new(mock_journey("j2", &["b", "c"]))];

        let candidates = pair_with_journeys(&arrivals, &journeys);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].arrival.service_journey.gid, "j2");
    }
}
