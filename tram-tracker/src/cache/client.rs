//! Transit client with caching and request deduplication.
//!
//! Journey details are cached for the default TTL; arrivals only briefly, so
//! that live refreshes still reach the upstream. Concurrent misses for the
//! same key share one upstream request.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{Arrival, JourneyDetail};
use crate::task::TaskHandle;
use crate::vasttrafik::{JourneyInclude, TransitApi, TransitError};

use super::dedup::{DEFAULT_DEDUP_WINDOW, RequestDeduplicator};
use super::store::EntityFetcher;
use super::ttl::{CacheConfig, CacheStats, TtlCache};

/// Result type shared between concurrent callers.
pub type SharedResult<T> = Result<Arc<T>, Arc<TransitError>>;

/// Journey detail sections always requested.
const JOURNEY_INCLUDES: &[JourneyInclude] = &[JourneyInclude::TripLegCoordinates];

/// Configuration for a [`CachedTransitClient`].
#[derive(Debug, Clone)]
pub struct CachedClientConfig {
    pub arrivals: CacheConfig,
    pub journeys: CacheConfig,
    pub dedup_window: Duration,
}

impl Default for CachedClientConfig {
    fn default() -> Self {
        Self {
            arrivals: CacheConfig::default()
                .with_ttl(Duration::from_secs(2))
                .with_max_entries(200),
            journeys: CacheConfig::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }
}

impl CachedClientConfig {
    pub fn with_arrivals(mut self, config: CacheConfig) -> Self {
        self.arrivals = config;
        self
    }

    pub fn with_journeys(mut self, config: CacheConfig) -> Self {
        self.journeys = config;
        self
    }
}

fn arrivals_key(gid: &str) -> String {
    format!("arrivals:{gid}:maxArrivalsPerLineAndDirection=1")
}

fn journey_key(reference: &str) -> String {
    let includes: Vec<&str> = JOURNEY_INCLUDES.iter().map(JourneyInclude::as_str).collect();
    format!("journey:{reference}:includes={}", includes.join(","))
}

/// Transit client with caching.
///
/// Wraps a [`TransitApi`] and caches arrival lists and journey details.
pub struct CachedTransitClient<A> {
    client: Arc<A>,
    arrivals: Arc<TtlCache<Arc<Vec<Arrival>>>>,
    journeys: Arc<TtlCache<Arc<JourneyDetail>>>,
    arrival_requests: Arc<RequestDeduplicator<Arc<Vec<Arrival>>, Arc<TransitError>>>,
    journey_requests: Arc<RequestDeduplicator<Arc<JourneyDetail>, Arc<TransitError>>>,
}

impl<A: TransitApi> CachedTransitClient<A> {
    pub fn new(client: A, config: &CachedClientConfig) -> Self {
        Self {
            client: Arc::new(client),
            arrivals: Arc::new(TtlCache::new(config.arrivals.clone())),
            journeys: Arc::new(TtlCache::new(config.journeys.clone())),
            arrival_requests: Arc::new(RequestDeduplicator::new(config.dedup_window)),
            journey_requests: Arc::new(RequestDeduplicator::new(config.dedup_window)),
        }
    }

    /// Upcoming arrivals at a stop point, using cache if available.
    pub async fn arrivals(&self, gid: &str) -> SharedResult<Vec<Arrival>> {
        let key = arrivals_key(gid);
        self.arrivals
            .get(&key, || {
                let client = Arc::clone(&self.client);
                let gid = gid.to_string();
                self.arrival_requests.dedupe(&key, move || async move {
                    client
                        .arrivals_for_stop(&gid)
                        .await
                        .map(Arc::new)
                        .map_err(Arc::new)
                })
            })
            .await
    }

    /// Journey detail with trip leg coordinates, using cache if available.
    pub async fn journey(&self, reference: &str) -> SharedResult<JourneyDetail> {
        let key = journey_key(reference);
        self.journeys
            .get(&key, || {
                let client = Arc::clone(&self.client);
                let reference = reference.to_string();
                self.journey_requests.dedupe(&key, move || async move {
                    client
                        .journey_detail(&reference, JOURNEY_INCLUDES)
                        .await
                        .map(Arc::new)
                        .map_err(Arc::new)
                })
            })
            .await
    }

    /// Access the underlying client for operations that bypass cache.
    pub fn client(&self) -> &A {
        &self.client
    }

    pub async fn arrival_cache_stats(&self) -> CacheStats {
        self.arrivals.stats().await
    }

    pub async fn journey_cache_stats(&self) -> CacheStats {
        self.journeys.stats().await
    }

    /// Invalidate all cached entries.
    pub async fn invalidate_cache(&self) {
        self.arrivals.clear().await;
        self.journeys.clear().await;
    }

    /// Start the background sweepers for both caches and the deduplicators.
    pub fn start_sweepers(&self) -> Vec<TaskHandle> {
        let arrival_requests = Arc::downgrade(&self.arrival_requests);
        let journey_requests = Arc::downgrade(&self.journey_requests);
        let window = self.arrival_requests.window();

        let dedup_sweeper = TaskHandle::spawn("dedup-sweeper", async move {
            let mut interval = tokio::time::interval(window);
            interval.tick().await; // First tick is immediate, skip it
            loop {
                interval.tick().await;
                let (Some(arrivals), Some(journeys)) =
                    (arrival_requests.upgrade(), journey_requests.upgrade())
                else {
                    break;
                };
                let stale = arrivals.cleanup().await + journeys.cleanup().await;
                if stale > 0 {
                    debug!(stale, "Dropped stale in-flight registrations");
                }
            }
        });

        vec![
            self.arrivals.start_sweeper(),
            self.journeys.start_sweeper(),
            dedup_sweeper,
        ]
    }
}

/// Feeds a live store with a stop point's arrivals.
pub struct ArrivalsFetcher<A> {
    client: Arc<CachedTransitClient<A>>,
}

impl<A> ArrivalsFetcher<A> {
    pub fn new(client: Arc<CachedTransitClient<A>>) -> Self {
        Self { client }
    }
}

impl<A: TransitApi> EntityFetcher for ArrivalsFetcher<A> {
    type Value = Arc<Vec<Arrival>>;

    async fn fetch(&self, gid: &str) -> SharedResult<Vec<Arrival>> {
        self.client.arrivals(gid).await
    }
}

/// Feeds a live store with journey details, keyed by details reference.
pub struct JourneyFetcher<A> {
    client: Arc<CachedTransitClient<A>>,
}

impl<A> JourneyFetcher<A> {
    pub fn new(client: Arc<CachedTransitClient<A>>) -> Self {
        Self { client }
    }
}

impl<A: TransitApi> EntityFetcher for JourneyFetcher<A> {
    type Value = Arc<JourneyDetail>;

    async fn fetch(&self, reference: &str) -> SharedResult<JourneyDetail> {
        self.client.journey(reference).await
    }
}
