//! Mock transit client for testing without API access.
//!
//! Serves canned stop areas, arrivals, departures and journey details either
//! loaded from JSON files or inserted directly by tests. Every endpoint counts
//! its calls so tests can assert how often the upstream was hit.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::domain::{Arrival, Departure, JourneyDetail, StopArea};

use super::api::{JourneyInclude, TransitApi};
use super::error::TransitError;

#[derive(Debug, Default)]
struct MockData {
    stop_areas: Vec<StopArea>,
    arrivals: HashMap<String, Vec<Arrival>>,
    departures: HashMap<String, Vec<Departure>>,
    journeys: HashMap<String, JourneyDetail>,
}

#[derive(Debug, Default)]
struct CallCounts {
    stop_areas: AtomicUsize,
    arrivals: AtomicUsize,
    departures: AtomicUsize,
    journeys: AtomicUsize,
}

/// Mock transit client that serves data from memory.
///
/// Clones share data, counters and the failure switch.
#[derive(Debug, Clone, Default)]
pub struct MockTransitClient {
    data: Arc<RwLock<MockData>>,
    calls: Arc<CallCounts>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MockTransitClient {
    /// An empty mock: no stops, no arrivals, no journeys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load mock data from a directory.
    ///
    /// Expects an optional `stop_areas.json` plus `arrivals/{gid}.json`,
    /// `departures/{gid}.json` and `journeys/{reference}.json`. Missing
    /// subdirectories are treated as empty.
    pub fn from_dir(data_dir: impl AsRef<Path>) -> Result<Self, TransitError> {
        let data_dir = data_dir.as_ref();
        if !data_dir.is_dir() {
            return Err(TransitError::NotConfigured(format!(
                "mock data directory {:?} does not exist",
                data_dir
            )));
        }

        let stop_areas_path = data_dir.join("stop_areas.json");
        let stop_areas = if stop_areas_path.is_file() {
            read_json(&stop_areas_path)?
        } else {
            Vec::new()
        };

        let data = MockData {
            stop_areas,
            arrivals: load_keyed(&data_dir.join("arrivals"))?,
            departures: load_keyed(&data_dir.join("departures"))?,
            journeys: load_keyed(&data_dir.join("journeys"))?,
        };

        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            ..Self::default()
        })
    }

    /// Delay every response by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn set_stop_areas(&self, stop_areas: Vec<StopArea>) {
        self.data.write().await.stop_areas = stop_areas;
    }

    /// Replace the arrivals served for a stop point.
    pub async fn set_arrivals(&self, gid: impl Into<String>, arrivals: Vec<Arrival>) {
        self.data.write().await.arrivals.insert(gid.into(), arrivals);
    }

    /// Replace the departures served for a stop point.
    pub async fn set_departures(&self, gid: impl Into<String>, departures: Vec<Departure>) {
        self.data
            .write()
            .await
            .departures
            .insert(gid.into(), departures);
    }

    pub async fn insert_journey(&self, reference: impl Into<String>, journey: JourneyDetail) {
        self.data
            .write()
            .await
            .journeys
            .insert(reference.into(), journey);
    }

    /// While set, every endpoint fails with a 503.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stop_area_calls(&self) -> usize {
        self.calls.stop_areas.load(Ordering::SeqCst)
    }

    pub fn arrival_calls(&self) -> usize {
        self.calls.arrivals.load(Ordering::SeqCst)
    }

    pub fn departure_calls(&self) -> usize {
        self.calls.departures.load(Ordering::SeqCst)
    }

    pub fn journey_calls(&self) -> usize {
        self.calls.journeys.load(Ordering::SeqCst)
    }

    /// Count the call, wait out the delay and apply the failure switch.
    async fn begin(&self, counter: &AtomicUsize) -> Result<(), TransitError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransitError::Api {
                status: 503,
                message: "mock upstream unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl TransitApi for MockTransitClient {
    async fn stop_areas(&self) -> Result<Vec<StopArea>, TransitError> {
        self.begin(&self.calls.stop_areas).await?;
        Ok(self.data.read().await.stop_areas.clone())
    }

    async fn arrivals_for_stop(&self, gid: &str) -> Result<Vec<Arrival>, TransitError> {
        self.begin(&self.calls.arrivals).await?;
        let data = self.data.read().await;
        Ok(data.arrivals.get(gid).cloned().unwrap_or_default())
    }

    async fn departures_for_stop(&self, gid: &str) -> Result<Vec<Departure>, TransitError> {
        self.begin(&self.calls.departures).await?;
        let data = self.data.read().await;
        Ok(data.departures.get(gid).cloned().unwrap_or_default())
    }

    async fn journey_detail(
        &self,
        reference: &str,
        _includes: &[JourneyInclude],
    ) -> Result<JourneyDetail, TransitError> {
        self.begin(&self.calls.journeys).await?;
        let data = self.data.read().await;
        data.journeys.get(reference).cloned().ok_or_else(|| {
            TransitError::NotFound(format!("journey {reference}"))
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TransitError> {
    let json = std::fs::read_to_string(path).map_err(|e| TransitError::Api {
        status: 0,
        message: format!("Failed to read {:?}: {}", path, e),
    })?;
    serde_json::from_str(&json).map_err(|e| TransitError::Json {
        message: format!("{:?}: {}", path, e),
        body: None,
    })
}

/// Load every `{key}.json` file in `dir`, keyed by file stem.
fn load_keyed<T: DeserializeOwned>(dir: &Path) -> Result<HashMap<String, T>, TransitError> {
    let mut loaded = HashMap::new();
    if !dir.is_dir() {
        return Ok(loaded);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| TransitError::Api {
        status: 0,
        message: format!("Failed to read mock data directory: {}", e),
    })?;

    for entry in entries {
        let path = entry
            .map_err(|e| TransitError::Api {
                status: 0,
                message: format!("Failed to read directory entry: {}", e),
            })?
            .path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        loaded.insert(key.to_string(), read_json(&path)?);
    }

    Ok(loaded)
}
