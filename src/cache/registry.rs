//! Registry of named [`CacheStore`] instances.
//!
//! One privileged `"default"` store is shared by every producer that has no
//! dedicated cache. Additional aliases can be registered (e.g. one per
//! agent), each with its own backing file.
//!
//! Locking is two-level: the registry mutex guards the alias table only;
//! each store guards its own contents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::CacheStore;
use crate::config::CacheSettings;
use crate::validate::is_safe_name;
use crate::{HuginnError, Result};

/// Alias of the shared store. Cannot be unregistered.
pub const DEFAULT_ALIAS: &str = "default";

/// Explicitly owned table of named cache stores.
#[derive(Debug)]
pub struct CacheManager {
    cache_dir: PathBuf,
    default: Arc<CacheStore>,
    stores: Mutex<HashMap<String, Arc<CacheStore>>>,
}

impl CacheManager {
    /// Create a registry whose default store is backed by `default_path`.
    ///
    /// Stores registered without an explicit path are placed in
    /// `cache_dir` as `{alias}_cache.json`.
    pub fn new(default_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        let default = Arc::new(CacheStore::open(default_path));
        let mut stores = HashMap::new();
        stores.insert(DEFAULT_ALIAS.to_string(), Arc::clone(&default));
        Self {
            cache_dir: cache_dir.into(),
            default,
            stores: Mutex::new(stores),
        }
    }

    /// Create a registry from the `[cache]` configuration section.
    pub fn from_config(config: &CacheSettings) -> Self {
        Self::new(config.default_store_path(), config.dir.clone())
    }

    /// Directory used for derived store paths.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The shared default store.
    pub fn default_store(&self) -> Arc<CacheStore> {
        Arc::clone(&self.default)
    }

    /// Look up a store by alias, without falling back.
    pub fn get(&self, alias: &str) -> Option<Arc<CacheStore>> {
        self.lock().get(alias).cloned()
    }

    /// Return the store registered under `alias`, or the default store.
    pub fn get_or_default(&self, alias: &str) -> Arc<CacheStore> {
        match self.lock().get(alias) {
            Some(store) => {
                debug!(alias, "using dedicated cache");
                Arc::clone(store)
            }
            None => {
                debug!(alias, "no dedicated cache, using default");
                Arc::clone(&self.default)
            }
        }
    }

    /// Register a store under `alias`.
    ///
    /// Idempotent: if `alias` is already registered the existing instance is
    /// returned and `path` is ignored. Without a `path`, the alias must be a
    /// safe identifier because it becomes part of the file name.
    ///
    /// A path already backing a registered store (the default store's file
    /// included) is never opened twice: the new alias shares that instance.
    pub fn register(&self, alias: &str, path: Option<PathBuf>) -> Result<Arc<CacheStore>> {
        let mut stores = self.lock();
        if let Some(existing) = stores.get(alias) {
            debug!(alias, "cache alias already registered");
            return Ok(Arc::clone(existing));
        }

        let path = match path {
            Some(p) => p,
            None => {
                if !is_safe_name(alias) {
                    return Err(HuginnError::InvalidInput(format!(
                        "cache alias {alias:?} cannot be used as a file name; pass an explicit path"
                    )));
                }
                self.cache_dir.join(format!("{alias}_cache.json"))
            }
        };

        let same_file = stores
            .values()
            .find(|store| store.path() == path.as_path())
            .map(Arc::clone);
        if let Some(existing) = same_file {
            info!(alias, path = %path.display(), "cache file already open, sharing store");
            stores.insert(alias.to_string(), Arc::clone(&existing));
            return Ok(existing);
        }

        info!(alias, path = %path.display(), "registering cache");
        let store = Arc::new(CacheStore::open(path));
        stores.insert(alias.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Remove a non-default alias. Returns whether anything was removed.
    ///
    /// The backing file is left on disk.
    pub fn unregister(&self, alias: &str) -> bool {
        if alias == DEFAULT_ALIAS {
            warn!("cannot unregister default cache");
            return false;
        }
        let removed = self.lock().remove(alias).is_some();
        if removed {
            info!(alias, "unregistered cache");
        } else {
            debug!(alias, "cannot unregister cache: not found");
        }
        removed
    }

    /// Names of all registered aliases (always includes `"default"`).
    pub fn list_aliases(&self) -> BTreeSet<String> {
        self.lock().keys().cloned().collect()
    }

    /// Entry count per alias.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.snapshot()
            .into_iter()
            .map(|(alias, store)| (alias, store.len()))
            .collect()
    }

    /// Clear every registered store.
    ///
    /// Stops at the first persistence failure.
    pub fn clear_all(&self) -> Result<()> {
        for (alias, store) in self.snapshot() {
            info!(alias = %alias, "clearing cache");
            store.clear()?;
        }
        Ok(())
    }

    /// Copy of the alias table, so store locks are never taken while the
    /// registry lock is held.
    fn snapshot(&self) -> Vec<(String, Arc<CacheStore>)> {
        self.lock()
            .iter()
            .map(|(alias, store)| (alias.clone(), Arc::clone(store)))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CacheStore>>> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
