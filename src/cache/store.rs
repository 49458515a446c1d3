//! Durable, file-backed result cache.
//!
//! [`CacheStore`] maps a SHA-256 digest of `"{namespace}::{content}"` to a
//! previously computed result string. The whole map lives in memory and is
//! rewritten to a single JSON file on every mutation (temp file + atomic
//! rename, see [`crate::persist`]).
//!
//! Entries never expire on their own; callers that want expiry layer it on
//! top (or use [`TtlCache`](crate::cache::TtlCache)).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::Result;
use crate::persist;
use crate::telemetry;

/// Thread-safe, file-backed key/value store.
///
/// All access, reads included, goes through one mutex per instance. Two
/// processes pointed at the same file can lose each other's updates; the
/// atomic rename only guarantees the file is never torn.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl CacheStore {
    /// Open the store backed by `path`.
    ///
    /// A missing file yields an empty store. A corrupt file is logged and
    /// also yields an empty store; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries: HashMap<String, String> = persist::load_json(&path).unwrap_or_default();
        debug!(path = %path.display(), entries = entries.len(), "opened cache store");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Compute the storage key for `(content, namespace)`.
    ///
    /// Lowercase hex SHA-256 of `"{namespace}::{content}"`. Stable across
    /// processes and platforms.
    pub fn compute_key(content: &str, namespace: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b"::");
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a value is cached for `(content, namespace)`.
    pub fn has(&self, content: &str, namespace: &str) -> bool {
        let key = Self::compute_key(content, namespace);
        self.lock().contains_key(&key)
    }

    /// Look up the cached value for `(content, namespace)`.
    ///
    /// Returns `None` on a miss.
    pub fn get(&self, content: &str, namespace: &str) -> Option<String> {
        let key = Self::compute_key(content, namespace);
        let value = self.lock().get(&key).cloned();
        if value.is_some() {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => "durable").increment(1);
            debug!(namespace, key = %key, "durable cache hit");
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => "durable").increment(1);
            debug!(namespace, key = %key, "durable cache miss");
        }
        value
    }

    /// Store `value` for `(content, namespace)` and persist the store.
    ///
    /// On a persistence failure the in-memory map is restored to its prior
    /// state before the error is returned.
    pub fn save(&self, content: &str, namespace: &str, value: impl Into<String>) -> Result<()> {
        let key = Self::compute_key(content, namespace);
        let mut entries = self.lock();
        let previous = entries.insert(key.clone(), value.into());

        if let Err(e) = persist::write_json_atomic(&self.path, &*entries) {
            match previous {
                Some(old) => entries.insert(key, old),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        metrics::counter!(telemetry::CACHE_WRITES_TOTAL).increment(1);
        Ok(())
    }

    /// Remove the entry for `(content, namespace)`.
    ///
    /// Returns `Ok(false)` if there was nothing to remove (no write happens).
    pub fn remove(&self, content: &str, namespace: &str) -> Result<bool> {
        let key = Self::compute_key(content, namespace);
        let mut entries = self.lock();
        let Some(old) = entries.remove(&key) else {
            return Ok(false);
        };

        if let Err(e) = persist::write_json_atomic(&self.path, &*entries) {
            entries.insert(key, old);
            return Err(e);
        }
        Ok(true)
    }

    /// Remove every entry and persist the empty store.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.lock();
        persist::write_json_atomic(&self.path, &HashMap::<String, String>::new())?;
        let count = entries.len();
        entries.clear();
        info!(path = %self.path.display(), count, "cleared cache store");
        Ok(())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys (digests). Order is not guaranteed.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// All cached values. Order is not guaranteed.
    pub fn values(&self) -> Vec<String> {
        self.lock().values().cloned().collect()
    }

    /// All `(key, value)` pairs. Order is not guaranteed.
    pub fn items(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // A panic while holding the lock cannot leave the map half-updated
    // (every mutation is a single insert/remove), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
