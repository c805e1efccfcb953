//! Live-data caching.
//!
//! Three layers sit between the tracker and the upstream API:
//! - [`TtlCache`]: keyed values kept for a time-to-live, bounded by LRU eviction
//! - [`RequestDeduplicator`]: concurrent callers of one key share a fetch
//! - [`LiveStore`]: self-refreshing entities with snapshot reads
//!
//! [`CachedTransitClient`] combines the first two in front of a [`TransitApi`];
//! its fetchers feed live stores.
//!
//! [`TransitApi`]: crate::vasttrafik::TransitApi

mod client;
mod dedup;
mod store;
mod ttl;

pub use client::{
    ArrivalsFetcher, CachedClientConfig, CachedTransitClient, JourneyFetcher, SharedResult,
};
pub use dedup::{DEFAULT_DEDUP_WINDOW, RequestDeduplicator};
pub use store::{EntityFetcher, LiveEntity, LiveSnapshot, LiveStore, StoreConfig, StoreStats};
pub use ttl::{CacheConfig, CacheStats, EntryStats, TtlCache};
