//! Keyed time-to-live cache with least-recently-used eviction.
//!
//! Values are produced on demand by an async producer. A live entry is served
//! without calling the producer; a missing or expired one is fetched, and the
//! result is stored only if the producer succeeded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::task::TaskHandle;

/// Configuration for a [`TtlCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default time-to-live for entries.
    pub ttl: Duration,

    /// Maximum number of entries.
    pub max_entries: usize,

    /// How often the background sweeper drops expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            max_entries: 1000,
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    /// Set the default TTL. The sweep interval follows it.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self.sweep_interval = ttl;
        self
    }

    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Statistics for one cached entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStats {
    pub key: String,
    pub access_count: u64,
    pub age: Duration,
}

/// Cache statistics (for monitoring).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    /// `accesses / (accesses + entries)`, or 0 when empty.
    pub hit_rate: f64,
    pub entries: Vec<EntryStats>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    access_count: u64,
    /// Access sequence number; larger is more recent.
    last_access: u64,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    clock: u64,
}

impl<V> Inner<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// TTL cache keyed by string.
#[derive(Debug)]
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    config: CacheConfig,
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a value, calling `producer` if there is no live entry.
    pub async fn get<F, Fut, E>(&self, key: &str, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.get_with_ttl(key, self.config.ttl, producer).await
    }

    /// As [`get`](Self::get), storing a fresh value with a custom TTL.
    pub async fn get_with_ttl<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let now = Instant::now();
            let tick = inner.tick();
            if let Some(entry) = inner.entries.get_mut(key)
                && entry.is_live(now)
            {
                entry.access_count += 1;
                entry.last_access = tick;
                trace!(key, "Cache hit");
                return Ok(entry.value.clone());
            }
        }

        trace!(key, "Cache miss");
        let value = producer().await?;
        self.insert_with_ttl(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Store a value with the default TTL.
    pub async fn insert(&self, key: &str, value: V) {
        self.insert_with_ttl(key, value, self.config.ttl).await;
    }

    /// Store a value, evicting the least recently accessed entry if full.
    ///
    /// Replacing an existing key (live or expired) never evicts.
    pub async fn insert_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        if self.config.max_entries == 0 {
            return;
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let tick = inner.tick();

        if !inner.entries.contains_key(key) && inner.entries.len() >= self.config.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(evicted = %oldest, "Cache full, evicting least recently used entry");
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
                access_count: 1,
                last_access: tick,
            },
        );
    }

    /// Remove an entry. Returns whether it was present.
    pub async fn remove(&self, key: &str) -> bool {
        self.inner.lock().await.entries.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.is_live(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            trace!(removed, "Swept expired cache entries");
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        let now = Instant::now();

        let entries: Vec<EntryStats> = inner
            .entries
            .iter()
            .map(|(key, e)| EntryStats {
                key: key.clone(),
                access_count: e.access_count,
                age: now.duration_since(e.stored_at),
            })
            .collect();

        let total: u64 = entries.iter().map(|e| e.access_count).sum();
        let hit_rate = if total > 0 {
            total as f64 / (total as f64 + entries.len() as f64)
        } else {
            0.0
        };

        CacheStats {
            size: entries.len(),
            max_entries: self.config.max_entries,
            hit_rate,
            entries,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Start a background task that sweeps expired entries.
    ///
    /// The task ends by itself once the cache is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> TaskHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let every = self.config.sweep_interval;
        TaskHandle::spawn("ttl-cache-sweeper", async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // First tick is immediate, skip it
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.cleanup().await;
            }
        })
    }
}
