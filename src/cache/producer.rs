//! Per-producer view over a shared [`TtlCache`].
//!
//! Every ingestion component (threat actors, indicators, reports, ...) shares
//! one record cache and owns the key prefix `"{producer}:"`. A handle can be
//! switched off, in which case lookups always miss and writes are dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::TtlCache;

/// Cache handle scoped to one producer's key prefix.
pub struct ProducerCache<V> {
    producer: String,
    cache: Arc<TtlCache<V>>,
    ttl: Duration,
    enabled: bool,
}

impl<V> ProducerCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an enabled handle using the cache's default TTL.
    pub fn new(producer: impl Into<String>, cache: Arc<TtlCache<V>>) -> Self {
        let ttl = cache.default_ttl();
        Self {
            producer: producer.into(),
            cache,
            ttl,
            enabled: true,
        }
    }

    /// Override the TTL for entries written through this handle.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable caching for this handle.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Producer name (the key prefix without the trailing `:`).
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Whether lookups and writes go to the cache.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cache key for an operation: `"{producer}:{operation}:{params}"`.
    pub fn key(&self, operation: &str, params: &str) -> String {
        format!("{}:{operation}:{params}", self.producer)
    }

    /// Look up a cached result for `(operation, params)`.
    pub fn get(&self, operation: &str, params: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }
        self.cache.get(&self.key(operation, params))
    }

    /// Cache a result for `(operation, params)`.
    pub fn put(&self, operation: &str, params: &str, value: V) {
        if !self.enabled {
            return;
        }
        self.cache
            .put_with_ttl(self.key(operation, params), value, self.ttl);
    }

    /// Return the cached result, or call `fetch` and cache what it returns.
    ///
    /// Errors from `fetch` are passed through and nothing is cached.
    pub fn get_or_fetch<E>(
        &self,
        operation: &str,
        params: &str,
        fetch: impl FnOnce() -> std::result::Result<V, E>,
    ) -> std::result::Result<V, E> {
        if let Some(hit) = self.get(operation, params) {
            return Ok(hit);
        }
        debug!(producer = %self.producer, operation, "cache miss, fetching");
        let value = fetch()?;
        self.put(operation, params, value.clone());
        Ok(value)
    }

    /// Drop every entry this producer cached. Returns the count removed.
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate_prefix(&format!("{}:", self.producer))
    }
}
