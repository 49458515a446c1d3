//! Ephemeral per-entry TTL cache.
//!
//! [`TtlCache`] keeps ingested records in memory for a limited time so that
//! repeated platform queries within the TTL are served locally. Keys are
//! free-form strings; the convention is `"{Producer}:{operation}:{params}"`
//! so that [`TtlCache::invalidate_prefix`] can drop everything one producer
//! cached. [`ProducerCache`](super::ProducerCache) applies that convention.
//!
//! Backed by moka with a per-entry [`Expiry`] policy: each `put` carries its
//! own TTL and overwrites the previous expiry. Expired entries read as
//! misses immediately and are purged lazily.
//!
//! Capacity is bounded. Past `max_entries` the least recently used entry is
//! evicted; a fresh `put` is always admitted.

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tracing::{debug, info};

use crate::telemetry;

/// Default time-to-live for ephemeral entries: 30 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1800);

/// Configuration for a [`TtlCache`].
///
/// ```rust
/// # use huginn::cache::TtlCacheConfig;
/// # use std::time::Duration;
/// let config = TtlCacheConfig::new()
///     .max_entries(5_000)
///     .default_ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    /// Maximum number of entries before LRU eviction. Default: 10,000.
    pub max_entries: u64,
    /// TTL applied by [`TtlCache::put`]. Default: 30 minutes.
    pub default_ttl: Duration,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: DEFAULT_TTL,
        }
    }
}

impl TtlCacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// A stored value together with the TTL it was written with.
#[derive(Clone)]
struct Timed<V> {
    value: V,
    ttl: Duration,
}

/// Expiry policy reading the TTL off each entry.
struct PerEntryTtl;

impl<V> Expiry<String, Timed<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Timed<V>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Timed<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe in-memory cache with per-entry expiry.
///
/// Cloning values out is cheap when `V` is reference-counted; the ingestion
/// layer stores `Vec<serde_json::Value>` and accepts the copy.
pub struct TtlCache<V> {
    entries: Cache<String, Timed<V>>,
    default_ttl: Duration,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache from the given configuration.
    pub fn new(config: &TtlCacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();
        Self {
            entries,
            default_ttl: config.default_ttl,
        }
    }

    /// TTL used by [`put`](Self::put).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live entry. Expired or absent entries return `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(timed) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => "ttl").increment(1);
                debug!(key, "ttl cache hit");
                Some(timed.value)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => "ttl").increment(1);
                None
            }
        }
    }

    /// Store `value` under `key` with the default TTL.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Store `value` under `key`, expiring `ttl` from now.
    ///
    /// Replaces any previous value and its expiry.
    pub fn put_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "cached entry");
        self.entries.insert(key, Timed { value, ttl });
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let doomed: Vec<_> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.entries.invalidate(key.as_str());
        }
        metrics::counter!(telemetry::CACHE_INVALIDATIONS_TOTAL).increment(doomed.len() as u64);
        info!(prefix, removed = doomed.len(), "invalidated cache prefix");
        doomed.len()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        info!("cleared ttl cache");
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(&TtlCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TtlCacheConfig::default();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.default_ttl, Duration::from_secs(1800));
    }

    #[test]
    fn config_builder_pattern() {
        let config = TtlCacheConfig::new()
            .max_entries(50)
            .default_ttl(Duration::from_secs(5));
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.default_ttl, Duration::from_secs(5));
    }

    #[test]
    fn newest_put_survives_at_capacity() {
        let cache: TtlCache<u32> = TtlCache::new(&TtlCacheConfig::new().max_entries(10));
        for i in 0..10 {
            cache.put(format!("old:{i}"), i);
        }
        for _ in 0..3 {
            for i in 0..10 {
                assert!(cache.get(&format!("old:{i}")).is_some());
            }
        }

        cache.put("fresh", 99);
        assert!(cache.len() <= 10);
        assert_eq!(cache.get("fresh"), Some(99));
    }

    #[test]
    fn overwrite_resets_expiry() {
        let cache: TtlCache<u32> = TtlCache::default();
        cache.put_with_ttl("k", 1, Duration::from_millis(30));
        cache.put_with_ttl("k", 2, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn shorter_ttl_on_overwrite_applies() {
        let cache: TtlCache<u32> = TtlCache::default();
        cache.put_with_ttl("k", 1, Duration::from_secs(60));
        cache.put_with_ttl("k", 2, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("k"), None);
    }
}
