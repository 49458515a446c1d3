//! Caching subsystem.
//!
//! Three layers:
//!
//! - [`CacheStore`]: durable JSON-file store for model results, keyed on
//!   a SHA-256 of `(namespace, content)`. No expiry.
//!
//! - [`CacheManager`]: explicitly owned registry of named stores with a
//!   privileged `"default"` store that can never be removed.
//!
//! - [`TtlCache`]: in-process cache for ingested records with per-entry
//!   TTL and prefix invalidation. [`ProducerCache`] scopes it to one
//!   producer's key prefix.

pub mod producer;
pub mod registry;
pub mod store;
pub mod ttl;

pub use producer::ProducerCache;
pub use registry::{CacheManager, DEFAULT_ALIAS};
pub use store::CacheStore;
pub use ttl::{DEFAULT_TTL, TtlCache, TtlCacheConfig};

/// A normalised record as produced by the ingestion layer.
pub type Record = serde_json::Value;

/// The shared record cache used by ingestion producers.
pub type RecordCache = TtlCache<Vec<Record>>;
