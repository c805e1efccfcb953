//! In-flight request deduplication.
//!
//! Concurrent callers asking for the same key share one upstream fetch and all
//! receive its result, success or failure. Results are not retained: once the
//! fetch settles the next caller starts a new one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Default window during which an in-flight fetch may be joined.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct InFlight<T, E> {
    id: u64,
    started: Instant,
    fetch: SharedFetch<T, E>,
}

type InFlightMap<T, E> = Arc<Mutex<HashMap<String, InFlight<T, E>>>>;

/// Shares in-flight fetches between concurrent callers of the same key.
///
/// An in-flight fetch older than the window is not joined; a new fetch
/// replaces its registration.
pub struct RequestDeduplicator<T, E> {
    in_flight: InFlightMap<T, E>,
    window: Duration,
    next_id: AtomicU64,
}

impl<T, E> Default for RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            window,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `f` for `key`, or join the fetch already running for it.
    pub async fn dedupe<F, Fut>(&self, key: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let fetch = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(key) {
                Some(existing) if existing.started.elapsed() < self.window => {
                    trace!(key, "Joining in-flight request");
                    existing.fetch.clone()
                }
                _ => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.register(key, id, f());
                    in_flight.insert(
                        key.to_string(),
                        InFlight {
                            id,
                            started: Instant::now(),
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Wrap `fut` so that it unregisters itself when it settles.
    fn register<Fut>(&self, key: &str, id: u64, fut: Fut) -> SharedFetch<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let in_flight = Arc::clone(&self.in_flight);
        let key = key.to_string();
        async move {
            let result = fut.await;
            let mut in_flight = in_flight.lock().await;
            // A newer fetch may have taken over the key after the window.
            if in_flight.get(&key).is_some_and(|e| e.id == id) {
                in_flight.remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Forget every in-flight registration. Running fetches are not cancelled.
    pub async fn clear(&self) {
        self.in_flight.lock().await.clear();
    }

    /// Drop registrations older than the window.
    pub async fn cleanup(&self) -> usize {
        let mut in_flight = self.in_flight.lock().await;
        let before = in_flight.len();
        in_flight.retain(|_, e| e.started.elapsed() < self.window);
        before - in_flight.len()
    }

    /// Number of registered in-flight fetches.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
