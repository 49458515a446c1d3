//! Huginn - caching and token accounting for threat-intelligence agents
//!
//! This crate provides the shared state that agent workers need around
//! model calls:
//!
//! - a durable content-addressed result cache ([`CacheStore`]) and a registry
//!   of named stores ([`CacheManager`]);
//! - an in-process TTL cache for ingested records ([`TtlCache`]), scoped per
//!   producer by [`ProducerCache`];
//! - a persistent token usage ledger with per-identity and system-wide
//!   quotas ([`TokenUsage`]);
//! - token estimation with lazily loaded tokenizers ([`TokenEstimator`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::{Config, Huginn};
//!
//! fn main() -> huginn::Result<()> {
//!     let huginn = Huginn::from_config(&Config::load(None)?)?;
//!
//!     let store = huginn.caches().default_store();
//!     if store.get("summarise this report", "summaries").is_none() {
//!         let tokens = huginn.usage().estimate("summarise this report");
//!         let outcome = huginn.usage().log("summariser", tokens as i64, 0)?;
//!         if outcome.is_recorded() {
//!             store.save("summarise this report", "summaries", "...")?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! All operations are synchronous and safe to call from many threads.

pub mod cache;
pub mod config;
pub mod error;
mod persist;
pub mod runtime;
pub mod telemetry;
pub mod tokenizer;
pub mod usage;
pub mod validate;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheManager, CacheStore, ProducerCache, RecordCache, TtlCache, TtlCacheConfig};
pub use config::Config;
pub use error::{HuginnError, Result};
pub use runtime::Huginn;
pub use tokenizer::{EstimatorConfig, TokenEstimator, TokenizerLoader, TokenizerProvider, TokenizerSource};
pub use usage::{LogOutcome, LogReceipt, TokenLimits, TokenUsage, UsageRecord};
pub use version::{PKG_VERSION, version_string};
