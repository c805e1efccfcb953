//! Tracker and process configuration.

use std::path::PathBuf;

use crate::cache::{CachedClientConfig, StoreConfig};
use crate::nearby::NearbyConfig;
use crate::vasttrafik::VasttrafikConfig;

/// Default path of the line catalog.
pub const DEFAULT_LINES_PATH: &str = "lines.json";

/// Configuration for a [`Tracker`](crate::tracker::Tracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Nearby-stop resolution.
    pub nearby: NearbyConfig,

    /// TTL caches and deduplication in front of the upstream.
    pub client: CachedClientConfig,

    /// Live arrival lists, one entity per stop point.
    pub arrivals: StoreConfig,

    /// Live journey details, one entity per details reference.
    pub journeys: StoreConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            nearby: NearbyConfig::default(),
            client: CachedClientConfig::default(),
            arrivals: StoreConfig::default().with_capacity(50),
            journeys: StoreConfig::default().with_capacity(100),
        }
    }
}

impl TrackerConfig {
    pub fn with_nearby(mut self, nearby: NearbyConfig) -> Self {
        self.nearby = nearby;
        self
    }

    pub fn with_client(mut self, client: CachedClientConfig) -> Self {
        self.client = client;
        self
    }

    pub fn with_arrivals(mut self, arrivals: StoreConfig) -> Self {
        self.arrivals = arrivals;
        self
    }

    pub fn with_journeys(mut self, journeys: StoreConfig) -> Self {
        self.journeys = journeys;
        self
    }
}

/// Where live data comes from.
#[derive(Debug, Clone)]
pub enum Upstream {
    /// The Västtrafik API.
    Vasttrafik(VasttrafikConfig),
    /// Canned JSON files in a directory.
    Mock(PathBuf),
}

/// Process settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub lines_path: PathBuf,
    pub upstream: Upstream,
    pub tracker: TrackerConfig,
}

impl Settings {
    /// Read `TRAM_LINES_PATH`, `TRAM_MOCK_DIR`, `VASTTRAFIK_CLIENT_ID` and
    /// `VASTTRAFIK_CLIENT_SECRET`.
    ///
    /// A mock directory takes precedence over credentials. Missing
    /// credentials are left empty; creating the client reports them.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lines_path = lookup("TRAM_LINES_PATH")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_LINES_PATH.to_string())
            .into();

        let upstream = match lookup("TRAM_MOCK_DIR").filter(|d| !d.is_empty()) {
            Some(dir) => Upstream::Mock(dir.into()),
            None => Upstream::Vasttrafik(VasttrafikConfig::new(
                lookup("VASTTRAFIK_CLIENT_ID").unwrap_or_default(),
                lookup("VASTTRAFIK_CLIENT_SECRET").unwrap_or_default(),
            )),
        };

        Self {
            lines_path,
            upstream,
            tracker: TrackerConfig::default(),
        }
    }
}
