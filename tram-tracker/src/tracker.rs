//! The tracker: from a rider's position to a ranked list of trams.
//!
//! Wires the nearby-stop resolver, the cached upstream client, the live
//! stores and the scorer together. Entry points:
//! - [`Tracker::on_position`] takes one fix from a position feed
//! - [`Tracker::match_position`] fetches what it needs (through the caches)
//!   and waits for it
//! - [`Tracker::live_match`] scores from whatever the live stores currently
//!   hold and never waits on the network

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{
    ArrivalsFetcher, CacheStats, CachedTransitClient, JourneyFetcher, LiveEntity, LiveStore,
    StoreStats,
};
use crate::config::TrackerConfig;
use crate::domain::{
    Arrival, CatalogError, JourneyDetail, LineCatalog, Point, Position, StopPoint,
};
use crate::identify::{
    ScoreError, ScoredArrival, pair_with_journeys, score_candidates, select_tram_arrivals,
};
use crate::nearby::{NearbyStopFinder, same_stops};
use crate::task::TaskHandle;
use crate::vasttrafik::{TransitApi, TransitError};

/// Errors from the tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Live data could not be fetched for any nearby stop or candidate
    #[error("live data unavailable: {0}")]
    Upstream(#[source] Arc<TransitError>),

    /// The line catalog could not be loaded
    #[error("line catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// The upstream client could not be created
    #[error("transit client: {0}")]
    Client(#[from] TransitError),
}

/// Result of matching a position.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Nothing to score: no nearby stops, no tram arrivals, or no journey
    /// details for them.
    NoMatch,

    /// Candidates ranked best first. Inapplicable and inconsistent ones are
    /// kept at the end.
    Ranked(Vec<ScoredArrival>),
}

impl MatchOutcome {
    pub fn ranked(&self) -> &[ScoredArrival] {
        match self {
            MatchOutcome::NoMatch => &[],
            MatchOutcome::Ranked(ranked) => ranked,
        }
    }

    /// The best candidate that could actually be scored.
    pub fn best(&self) -> Option<&ScoredArrival> {
        self.ranked().first().filter(|c| c.score().millis().is_some())
    }

    /// Candidates whose upstream data contradicts itself.
    pub fn faults(&self) -> impl Iterator<Item = (&Arrival, &ScoreError)> {
        self.ranked()
            .iter()
            .filter_map(|c| c.fault().map(|e| (&c.arrival, e)))
    }

    pub fn is_match(&self) -> bool {
        self.best().is_some()
    }
}

/// Store and cache sizes (for monitoring).
#[derive(Debug, Clone)]
pub struct TrackerStats {
    pub nearby_memo: u64,
    pub arrival_entities: StoreStats,
    pub journey_entities: StoreStats,
    pub arrival_cache: CacheStats,
    pub journey_cache: CacheStats,
}

/// Live arrivals at one stop point.
pub type ArrivalEntity = LiveEntity<Arc<Vec<Arrival>>>;

/// Tram tracker over one upstream.
pub struct Tracker<A: TransitApi> {
    finder: NearbyStopFinder,
    client: Arc<CachedTransitClient<A>>,
    arrivals: Arc<LiveStore<ArrivalsFetcher<A>>>,
    journeys: Arc<LiveStore<JourneyFetcher<A>>>,
    /// Nearby stops as of the last position fix.
    current_stops: Mutex<Arc<Vec<StopPoint>>>,
    background: Mutex<Vec<TaskHandle>>,
}

impl<A: TransitApi> Tracker<A> {
    pub fn new(catalog: LineCatalog, upstream: A, config: TrackerConfig) -> Self {
        let client = Arc::new(CachedTransitClient::new(upstream, &config.client));
        let arrivals = LiveStore::new(
            "arrivals",
            Arc::new(ArrivalsFetcher::new(Arc::clone(&client))),
            config.arrivals,
        );
        let journeys = LiveStore::new(
            "journeys",
            Arc::new(JourneyFetcher::new(Arc::clone(&client))),
            config.journeys,
        );

        Self {
            finder: NearbyStopFinder::new(catalog, config.nearby),
            client,
            arrivals: Arc::new(arrivals),
            journeys: Arc::new(journeys),
            current_stops: Mutex::new(Arc::default()),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> &LineCatalog {
        self.finder.catalog()
    }

    pub fn client(&self) -> &CachedTransitClient<A> {
        &self.client
    }

    /// The next stop on each line near `position`.
    pub async fn nearby_stops(&self, position: Point) -> Arc<Vec<StopPoint>> {
        self.finder.find(position).await
    }

    /// Nearby stops as of the last [`on_position`](Self::on_position) fix.
    pub fn current_stops(&self) -> Arc<Vec<StopPoint>> {
        match self.current_stops.lock() {
            Ok(current) => Arc::clone(&current),
            Err(_) => Arc::default(),
        }
    }

    /// Handle one fix from the position feed.
    ///
    /// When the set of nearby stops differs from the previous fix, live
    /// arrival entities are started for the new stops. Candidates are then
    /// ranked at the fix's own timestamp.
    pub async fn on_position(&self, position: Position) -> Result<MatchOutcome, TrackerError> {
        let nearby = self.nearby_stops(position.point).await;
        let changed = match self.current_stops.lock() {
            Ok(mut current) if !same_stops(&current, &nearby) => {
                *current = Arc::clone(&nearby);
                true
            }
            _ => false,
        };
        if changed {
            let names: Vec<&str> = nearby.iter().map(|s| s.name.as_str()).collect();
            info!(position = %position.point, stops = ?names, "Nearby stops changed");
            self.watch_stops(&nearby).await;
        }

        self.match_position(position.point, position.timestamp).await
    }

    /// Rank the trams approaching the stops near `position` by how well each
    /// explains being at `position` at `now`.
    ///
    /// Fetches go through the TTL caches, so repeated calls are cheap. Partial
    /// upstream failures are logged and skipped; if every fetch at a stage
    /// fails the error is returned.
    pub async fn match_position(
        &self,
        position: Point,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, TrackerError> {
        let nearby = self.nearby_stops(position).await;
        if nearby.is_empty() {
            debug!(%position, "No lines nearby");
            return Ok(MatchOutcome::NoMatch);
        }

        // Warm the live stores so later live matches have data.
        self.arrivals
            .preload(nearby.iter().map(|s| s.gid.as_str()))
            .await;

        let fetches = nearby.iter().map(|stop| async move {
            let result = self.client.arrivals(&stop.gid).await;
            (stop, result)
        });
        let mut arrivals: Vec<Arrival> = Vec::new();
        let mut failure = None;
        let mut succeeded = 0;
        for (stop, result) in join_all(fetches).await {
            match result {
                Ok(list) => {
                    succeeded += 1;
                    arrivals.extend(list.iter().cloned());
                }
                Err(e) => {
                    warn!(stop = %stop.gid, error = %e, "Failed to fetch arrivals");
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure
            && succeeded == 0
        {
            return Err(TrackerError::Upstream(e));
        }

        let trams = select_tram_arrivals(&arrivals);
        if trams.is_empty() {
            debug!(stops = nearby.len(), arrivals = arrivals.len(), "No tram arrivals");
            return Ok(MatchOutcome::NoMatch);
        }

        let fetches = trams.iter().filter_map(|a| a.details_reference.as_deref()).map(
            |reference| async move { (reference, self.client.journey(reference).await) },
        );
        let mut journeys: Vec<Arc<JourneyDetail>> = Vec::new();
        let mut failure = None;
        for (reference, result) in join_all(fetches).await {
            match result {
                Ok(journey) => journeys.push(journey),
                Err(e) => {
                    warn!(reference, error = %e, "Failed to fetch journey detail");
                    failure = Some(e);
                }
            }
        }
        if let Some(e) = failure
            && journeys.is_empty()
        {
            return Err(TrackerError::Upstream(e));
        }

        Ok(self.rank(position, now, &trams, &journeys))
    }

    /// Start live arrival entities for `stops`, creating them as needed.
    ///
    /// Entities keep refreshing until evicted or idle past the store's max
    /// age.
    pub async fn watch_stops(&self, stops: &[StopPoint]) -> Vec<Arc<ArrivalEntity>> {
        let mut entities = Vec::with_capacity(stops.len());
        for stop in stops {
            entities.push(self.arrivals.get(&stop.gid).await);
        }
        entities
    }

    /// Rank candidates using only what the live stores hold right now.
    ///
    /// Stops and journeys seen for the first time are started in the
    /// background and contribute on a later call.
    pub async fn live_match(&self, position: Point, now: DateTime<Utc>) -> MatchOutcome {
        let nearby = self.nearby_stops(position).await;
        let arrivals: Vec<Arrival> = self
            .watch_stops(&nearby)
            .await
            .iter()
            .filter_map(|entity| entity.value())
            .flat_map(Arc::unwrap_or_clone)
            .collect();

        let trams = select_tram_arrivals(&arrivals);
        let mut journeys = Vec::new();
        for reference in trams.iter().filter_map(|a| a.details_reference.as_deref()) {
            if let Some(journey) = self.journeys.get(reference).await.value() {
                journeys.push(journey);
            }
        }

        self.rank(position, now, &trams, &journeys)
    }

    fn rank(
        &self,
        position: Point,
        now: DateTime<Utc>,
        trams: &[Arrival],
        journeys: &[Arc<JourneyDetail>],
    ) -> MatchOutcome {
        let candidates = pair_with_journeys(trams, journeys);
        if candidates.is_empty() {
            debug!(trams = trams.len(), journeys = journeys.len(), "No candidates to score");
            return MatchOutcome::NoMatch;
        }

        let ranked = score_candidates(position, now, &candidates);
        let outcome = MatchOutcome::Ranked(ranked);
        for (arrival, fault) in outcome.faults() {
            warn!(
                journey = %arrival.service_journey.gid,
                error = %fault,
                "Inconsistent journey data"
            );
        }
        debug!(
            candidates = candidates.len(),
            best_ms = outcome.best().and_then(|c| c.score().millis()),
            "Ranked candidates"
        );
        outcome
    }

    /// Start cache sweepers and live-store cleanup. Idempotent.
    pub fn start_background(&self) {
        let Ok(mut background) = self.background.lock() else {
            return;
        };
        if !background.is_empty() {
            return;
        }
        background.extend(self.client.start_sweepers());
        background.push(self.arrivals.start_cleanup());
        background.push(self.journeys.start_cleanup());
        debug!(tasks = background.len(), "Started background tasks");
    }

    /// Stop all background work and discard live entities.
    pub async fn shutdown(&self) {
        let tasks: Vec<TaskHandle> = match self.background.lock() {
            Ok(mut background) => background.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in &tasks {
            task.stop();
        }
        self.arrivals.shutdown().await;
        self.journeys.shutdown().await;
    }

    pub async fn stats(&self) -> TrackerStats {
        TrackerStats {
            nearby_memo: self.finder.memo_size(),
            arrival_entities: self.arrivals.stats().await,
            journey_entities: self.journeys.stats().await,
            arrival_cache: self.client.arrival_cache_stats().await,
            journey_cache: self.client.journey_cache_stats().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Call, Coordinate, Line, LineInfo, ServiceJourney, TransportMode, TripLeg,
    };
    use crate::identify::Score;
    use crate::vasttrafik::MockTransitClient;
    use chrono::Duration;

    fn p(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon)
    }

    fn t0() -> DateTime<Utc> {
        "2026-10-18T10:00:00Z".parse().unwrap()
    }

    fn stop(gid: &str, i: usize) -> StopPoint {
        StopPoint::new(gid, gid.to_uppercase(), p(0.0, 0.01 * i as f64))
    }

    const STOPS: [&str; 4] = ["a", "b", "c", "d"];

    /// Line 3 along the equator, stop `i` at longitude `0.01 * i`.
    fn catalog() -> LineCatalog {
        LineCatalog::new(vec![Line {
            info: LineInfo {
                short_name: Some("3".into()),
                transport_mode: TransportMode::Tram,
                ..Default::default()
            },
            coordinates: (0..STOPS.len()).map(|i| p(0.0, 0.01 * i as f64)).collect(),
            stop_points: STOPS.iter().enumerate().map(|(i, g)| stop(g, i)).collect(),
        }])
    }

    fn service_journey(gid: &str, mode: TransportMode) -> ServiceJourney {
        ServiceJourney {
            gid: gid.into(),
            origin: None,
            direction: None,
            line: LineInfo {
                short_name: Some("3".into()),
                transport_mode: mode,
                ..Default::default()
            },
        }
    }

    /// Leaves stop `i` at `t0 + offset + 10 min * (i - 1)`.
    fn journey(gid: &str, offset_ms: i64) -> JourneyDetail {
        let calls = STOPS
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let mut call = Call::new(stop(g, i));
                let at = t0() + Duration::milliseconds(offset_ms + 600_000 * (i as i64 - 1));
                if i > 0 {
                    call.planned_arrival_time = Some(at);
                }
                if i + 1 < STOPS.len() {
                    call.planned_departure_time = Some(at);
                }
                call
            })
            .collect();
        JourneyDetail {
            trip_legs: vec![TripLeg {
                service_journeys: vec![service_journey(gid, TransportMode::Tram)],
                calls_on_trip_leg: calls,
                trip_leg_coordinates: Some(
                    (0..STOPS.len())
                        .map(|i| Coordinate {
                            latitude: 0.0,
                            longitude: 0.01 * i as f64,
                        })
                        .collect(),
                ),
            }],
        }
    }

    fn arrival(journey_gid: &str, reference: &str, mode: TransportMode) -> Arrival {
        Arrival {
            details_reference: Some(reference.into()),
            service_journey: service_journey(journey_gid, mode),
            stop_point: stop("c", 2),
            planned_time: t0(),
            estimated_time: None,
            estimated_otherwise_planned_time: None,
            is_cancelled: false,
            is_part_cancelled: false,
        }
    }

    /// Two trams approach c: j1 on time, j2 two minutes behind. A bus too.
    async fn mock() -> MockTransitClient {
        let mock = MockTransitClient::new();
        mock.set_arrivals(
            "c",
            vec![
                arrival("j1", "r1", TransportMode::Tram),
                arrival("j2", "r2", TransportMode::Tram),
                arrival("bus", "rb", TransportMode::Bus),
            ],
        )
        .await;
        mock.insert_journey("r1", journey("j1", 0)).await;
        mock.insert_journey("r2", journey("j2", 120_000)).await;
        mock
    }

    fn rider() -> Point {
        p(0.0001, 0.015)
    }

    fn now() -> DateTime<Utc> {
        t0() + Duration::milliseconds(300_000)
    }

    #[tokio::test]
    async fn matches_the_tram_that_explains_the_position() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock.clone(), TrackerConfig::default());

        let outcome = tracker.match_position(rider(), now()).await.unwrap();
        let ranked = outcome.ranked();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].arrival.service_journey.gid, "j1");
        assert_eq!(ranked[0].score(), Score::Millis(0));
        assert_eq!(ranked[1].score(), Score::Millis(120_000));
        assert!(outcome.is_match());
        assert_eq!(outcome.faults().count(), 0);

        // The bus is never looked up.
        assert_eq!(mock.journey_calls(), 2);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn position_fixes_track_nearby_stops() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock.clone(), TrackerConfig::default());
        assert!(tracker.current_stops().is_empty());

        let outcome = tracker.on_position(Position::new(rider(), now())).await.unwrap();
        assert_eq!(outcome.ranked()[0].arrival.service_journey.gid, "j1");
        assert_eq!(outcome.ranked()[0].score(), Score::Millis(0));
        let gids: Vec<String> = tracker.current_stops().iter().map(|s| s.gid.clone()).collect();
        assert_eq!(gids, ["c"]);
        assert!(tracker.stats().await.arrival_entities.size >= 1);

        // Leaving every line clears the stop list.
        let outcome = tracker.on_position(Position::new(p(1.0, 1.0), now())).await.unwrap();
        assert!(matches!(outcome, MatchOutcome::NoMatch));
        assert!(tracker.current_stops().is_empty());
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn fixes_are_scored_at_their_own_timestamp() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock, TrackerConfig::default());

        // Fifty seconds early for j1.
        let at = now() - Duration::milliseconds(50_000);
        let outcome = tracker.on_position(Position::new(rider(), at)).await.unwrap();
        assert_eq!(outcome.ranked()[0].score(), Score::Millis(50_000));
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_matches_hit_the_cache() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock.clone(), TrackerConfig::default());

        tracker.match_position(rider(), now()).await.unwrap();
        tracker.match_position(rider(), now()).await.unwrap();
        assert_eq!(mock.journey_calls(), 2);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn far_from_every_line_is_no_match() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock.clone(), TrackerConfig::default());

        let outcome = tracker.match_position(p(1.0, 1.0), now()).await.unwrap();
        assert!(matches!(outcome, MatchOutcome::NoMatch));
        assert_eq!(mock.arrival_calls(), 0);
    }

    #[tokio::test]
    async fn upstream_down_is_an_error() {
        let mock = mock().await;
        mock.set_failing(true);
        let tracker = Tracker::new(catalog(), mock, TrackerConfig::default());

        let err = tracker.match_position(rider(), now()).await.unwrap_err();
        assert!(matches!(err, TrackerError::Upstream(_)));
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn missing_journey_details_are_skipped() {
        let mock = mock().await;
        mock.set_arrivals(
            "c",
            vec![
                arrival("j1", "r1", TransportMode::Tram),
                arrival("j9", "r9", TransportMode::Tram),
            ],
        )
        .await;
        let tracker = Tracker::new(catalog(), mock, TrackerConfig::default());

        let outcome = tracker.match_position(rider(), now()).await.unwrap();
        assert_eq!(outcome.ranked().len(), 1);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn inconsistent_journeys_are_reported() {
        let mock = mock().await;
        let mut broken = journey("j1", 0);
        broken.trip_legs[0].calls_on_trip_leg[1].planned_departure_time = None;
        mock.insert_journey("r1", broken).await;
        let tracker = Tracker::new(catalog(), mock, TrackerConfig::default());

        let outcome = tracker.match_position(rider(), now()).await.unwrap();
        assert_eq!(outcome.faults().count(), 1);
        assert_eq!(outcome.best().unwrap().arrival.service_journey.gid, "j2");
        assert_eq!(outcome.ranked().last().unwrap().score(), Score::Inapplicable);
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn live_match_uses_store_snapshots() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock, TrackerConfig::default());

        // Nothing loaded yet.
        assert!(matches!(
            tracker.live_match(rider(), now()).await,
            MatchOutcome::NoMatch
        ));

        // Arrivals land, then the journeys they reference.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tracker.live_match(rider(), now()).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let outcome = tracker.live_match(rider(), now()).await;
        assert_eq!(outcome.ranked().len(), 2);
        assert_eq!(outcome.ranked()[0].score(), Score::Millis(0));

        let stats = tracker.stats().await;
        assert_eq!(stats.arrival_entities.size, 1);
        assert_eq!(stats.journey_entities.size, 2);
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watch_stops_returns_refreshing_entities() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock.clone(), TrackerConfig::default());

        let entities = tracker.watch_stops(&[stop("c", 2)]).await;
        let snapshot = entities[0].loaded().await;
        assert_eq!(snapshot.value.map(|v| v.len()), Some(3));

        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
        assert_eq!(mock.arrival_calls(), 2);
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_background_work() {
        let mock = mock().await;
        let tracker = Tracker::new(catalog(), mock.clone(), TrackerConfig::default());
        tracker.start_background();
        tracker.start_background();
        tracker.watch_stops(&[stop("c", 2)]).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        tracker.shutdown().await;
        let calls = mock.arrival_calls();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        assert_eq!(mock.arrival_calls(), calls);
        assert_eq!(tracker.stats().await.arrival_entities.size, 0);
    }

    #[tokio::test]
    async fn bundled_demo_data_matches() {
        let data = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let catalog = LineCatalog::load(data.join("lines.json")).unwrap();
        let mock = MockTransitClient::from_dir(data.join("mock")).unwrap();
        let tracker = Tracker::new(catalog, mock, TrackerConfig::default());

        // Halfway between Beta and Gamma at 08:06.
        let now: DateTime<Utc> = "2026-10-18T08:06:00Z".parse().unwrap();
        let outcome = tracker.match_position(p(57.715, 11.9601), now).await.unwrap();

        let ranked = outcome.ranked();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].arrival.details_reference.as_deref(), Some("demo-6-0800"));
        assert!(ranked[0].score().millis().is_some_and(|ms| ms < 1_000));
        assert!(
            ranked[1]
                .score()
                .millis()
                .is_some_and(|ms| ms.abs_diff(600_000) < 1_000)
        );
        tracker.shutdown().await;
    }
}
