//! Self-refreshing live data, one entity per key.
//!
//! A [`LiveStore`] hands out shared [`LiveEntity`] handles. Each entity owns a
//! background task that fetches its key immediately and then on a fixed
//! interval, publishing complete [`LiveSnapshot`]s through a watch channel.
//! The store bounds how many entities exist (least recently used are evicted)
//! and discards entities nobody has asked for within the max age.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::task::TaskHandle;
use crate::vasttrafik::TransitError;

/// Fetches the current value for one key of a [`LiveStore`].
pub trait EntityFetcher: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn fetch(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Self::Value, Arc<TransitError>>> + Send;
}

/// Configuration for a [`LiveStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of live entities.
    pub capacity: usize,

    /// How often each entity refetches.
    pub refresh_interval: Duration,

    /// Entities not accessed for longer than this are discarded.
    pub max_age: Duration,

    /// How often the cleanup pass runs.
    pub cleanup_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            refresh_interval: Duration::from_secs(3),
            max_age: Duration::from_secs(2 * 60),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// A consistent view of an entity's state.
#[derive(Debug, Clone)]
pub struct LiveSnapshot<V> {
    /// Latest successfully fetched value. Cleared when a fetch fails.
    pub value: Option<V>,
    /// Error from the latest fetch, if it failed.
    pub error: Option<Arc<TransitError>>,
    /// Whether a fetch newer than the current state is outstanding.
    pub loading: bool,
    /// When the current state was applied.
    pub updated_at: Option<Instant>,
    started: u64,
    applied: u64,
}

/// The state of an entity whose first fetch has not completed.
impl<V> Default for LiveSnapshot<V> {
    fn default() -> Self {
        Self {
            value: None,
            error: None,
            loading: true,
            updated_at: None,
            started: 0,
            applied: 0,
        }
    }
}

impl<V> LiveSnapshot<V> {
    /// Whether any fetch has completed yet.
    pub fn is_loaded(&self) -> bool {
        self.applied > 0
    }

    /// Sequence number of the fetch this snapshot reflects (0 before any).
    pub fn sequence(&self) -> u64 {
        self.applied
    }

    fn begin(&mut self, seq: u64) {
        self.started = seq;
        self.loading = true;
    }

    /// Apply the result of fetch `seq`. Older results than the current
    /// state are ignored.
    fn apply(&mut self, seq: u64, result: Result<V, Arc<TransitError>>) -> bool {
        if seq <= self.applied {
            return false;
        }
        self.applied = seq;
        self.loading = self.applied < self.started;
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.error = None;
            }
            Err(error) => {
                self.value = None;
                self.error = Some(error);
            }
        }
        self.updated_at = Some(Instant::now());
        true
    }
}

/// A self-refreshing value for one key.
///
/// The refresh task stops when the entity is evicted from its store, stopped
/// explicitly, or dropped. The task owns the only sender, so stopping it
/// closes the channel and wakes every waiter.
#[derive(Debug)]
pub struct LiveEntity<V> {
    key: String,
    state: watch::Receiver<LiveSnapshot<V>>,
    refresh: TaskHandle,
}

impl<V: Clone + Send + Sync + 'static> LiveEntity<V> {
    fn spawn<F>(key: &str, fetcher: Arc<F>, every: Duration) -> Self
    where
        F: EntityFetcher<Value = V>,
    {
        let (sender, state) = watch::channel(LiveSnapshot::default());
        let refresh = TaskHandle::spawn(
            "live-entity-refresh",
            refresh_loop(key.to_string(), fetcher, sender, every),
        );
        Self {
            key: key.to_string(),
            state,
            refresh,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> LiveSnapshot<V> {
        self.state.borrow().clone()
    }

    /// The current value, if the latest fetch succeeded.
    pub fn value(&self) -> Option<V> {
        self.state.borrow().value.clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot<V>> {
        self.state.clone()
    }

    /// Wait until the first fetch has completed, or until the entity stops.
    ///
    /// A stopped entity yields its last snapshot, which may still be loading.
    pub async fn loaded(&self) -> LiveSnapshot<V> {
        let mut rx = self.state.clone();
        if let Ok(snapshot) = rx.wait_for(LiveSnapshot::is_loaded).await {
            return snapshot.clone();
        }
        rx.borrow().clone()
    }

    pub fn stop(&self) {
        self.refresh.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.refresh.is_finished()
    }
}

/// Fetch now and on every tick; fetches run concurrently and may finish out
/// of order.
async fn refresh_loop<F: EntityFetcher>(
    key: String,
    fetcher: Arc<F>,
    state: watch::Sender<LiveSnapshot<F::Value>>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fetches = JoinSet::new();
    let mut next_seq = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                next_seq += 1;
                let seq = next_seq;
                state.send_modify(|s| s.begin(seq));
                let fetcher = Arc::clone(&fetcher);
                let key = key.clone();
                fetches.spawn(async move { (seq, fetcher.fetch(&key).await) });
            }
            Some(joined) = fetches.join_next() => {
                let Ok((seq, result)) = joined else {
                    continue;
                };
                if let Err(error) = &result {
                    debug!(key = %key, seq, error = %error, "Refresh failed");
                }
                if !state.send_if_modified(|s| s.apply(seq, result)) {
                    trace!(key = %key, seq, "Discarding stale refresh result");
                }
            }
        }
    }
}

/// Store size (for monitoring).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub size: usize,
    pub capacity: usize,
}

struct Slot<V> {
    entity: Arc<LiveEntity<V>>,
    last_accessed: Instant,
    /// Access sequence number; larger is more recent.
    last_access: u64,
}

struct StoreInner<V> {
    slots: HashMap<String, Slot<V>>,
    clock: u64,
}

/// Bounded set of live entities sharing one fetcher.
pub struct LiveStore<F: EntityFetcher> {
    name: &'static str,
    fetcher: Arc<F>,
    config: StoreConfig,
    inner: Mutex<StoreInner<F::Value>>,
}

impl<F: EntityFetcher> LiveStore<F> {
    pub fn new(name: &'static str, fetcher: Arc<F>, config: StoreConfig) -> Self {
        Self {
            name,
            fetcher,
            config,
            inner: Mutex::new(StoreInner {
                slots: HashMap::new(),
                clock: 0,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The entity for `key`, created (and its refresh started) if needed.
    ///
    /// Creating an entity in a full store evicts the least recently used one.
    pub async fn get(&self, key: &str) -> Arc<LiveEntity<F::Value>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.clock += 1;
        let tick = inner.clock;

        if let Some(slot) = inner.slots.get_mut(key) {
            slot.last_accessed = Instant::now();
            slot.last_access = tick;
            return Arc::clone(&slot.entity);
        }

        if inner.slots.len() >= self.config.capacity {
            let oldest = inner
                .slots
                .iter()
                .min_by_key(|(_, s)| s.last_access)
                .map(|(k, _)| k.clone());
            if let Some(slot) = oldest.and_then(|k| inner.slots.remove(&k)) {
                debug!(store = self.name, evicted = slot.entity.key(), "Store full, evicting");
                slot.entity.stop();
            }
        }

        self.insert(inner, key, tick)
    }

    /// Start entities for keys not yet present, while there is room.
    ///
    /// Returns how many were created. Never evicts.
    pub async fn preload<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> usize {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let mut created = 0;

        for key in keys {
            if inner.slots.contains_key(key) {
                continue;
            }
            if inner.slots.len() >= self.config.capacity {
                break;
            }
            inner.clock += 1;
            let tick = inner.clock;
            self.insert(inner, key, tick);
            created += 1;
        }

        if created > 0 {
            debug!(store = self.name, created, "Preloaded entities");
        }
        created
    }

    fn insert(
        &self,
        inner: &mut StoreInner<F::Value>,
        key: &str,
        tick: u64,
    ) -> Arc<LiveEntity<F::Value>> {
        trace!(store = self.name, key, "Starting live entity");
        let entity = Arc::new(LiveEntity::spawn(
            key,
            Arc::clone(&self.fetcher),
            self.config.refresh_interval,
        ));
        inner.slots.insert(
            key.to_string(),
            Slot {
                entity: Arc::clone(&entity),
                last_accessed: Instant::now(),
                last_access: tick,
            },
        );
        entity
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.lock().await.slots.contains_key(key)
    }

    /// Remove and stop the entity for `key`.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.inner.lock().await.slots.remove(key);
        match removed {
            Some(slot) => {
                slot.entity.stop();
                true
            }
            None => false,
        }
    }

    /// Discard entities not accessed within the max age. Returns how many.
    pub async fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let max_age = self.config.max_age;
        let before = inner.slots.len();
        inner.slots.retain(|_, slot| {
            let keep = slot.last_accessed.elapsed() <= max_age;
            if !keep {
                slot.entity.stop();
            }
            keep
        });
        let removed = before - inner.slots.len();
        if removed > 0 {
            debug!(store = self.name, removed, "Discarded idle entities");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            size: self.len().await,
            capacity: self.config.capacity,
        }
    }

    /// Stop every entity and empty the store.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        for slot in inner.slots.values() {
            slot.entity.stop();
        }
        inner.slots.clear();
    }

    /// Start the periodic cleanup pass.
    ///
    /// The task ends by itself once the store is dropped.
    pub fn start_cleanup(self: &Arc<Self>) -> TaskHandle {
        let store: Weak<Self> = Arc::downgrade(self);
        let every = self.config.cleanup_interval;
        TaskHandle::spawn("live-store-cleanup", async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // First tick is immediate, skip it
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.cleanup().await;
            }
        })
    }
}

impl<F: EntityFetcher> Drop for LiveStore<F> {
    fn drop(&mut self) {
        for slot in self.inner.get_mut().slots.values() {
            slot.entity.stop();
        }
    }
}
