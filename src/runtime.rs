//! Composition root.
//!
//! [`Huginn`] builds every shared component once from a [`Config`] and hands
//! out references. Components are never constructed lazily behind globals;
//! callers that need one hold the `Huginn` (or an `Arc` it gave them).

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::cache::{CacheManager, ProducerCache, Record, RecordCache, TtlCache};
use crate::config::Config;
use crate::tokenizer::TokenEstimator;
use crate::usage::TokenUsage;

/// Shared runtime components.
pub struct Huginn {
    caches: Arc<CacheManager>,
    records: Arc<RecordCache>,
    estimator: Arc<TokenEstimator>,
    usage: Arc<TokenUsage>,
}

impl Huginn {
    /// Construct every component from `config`.
    ///
    /// Per-identity `*_TOKEN_LIMIT` overrides are captured from the process
    /// environment here, once.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let caches = Arc::new(CacheManager::from_config(&config.cache));
        let records = Arc::new(TtlCache::new(&config.cache.ttl_cache_config()));
        let estimator = Arc::new(TokenEstimator::new(&config.tokenizer.estimator_config()));
        let usage = TokenUsage::builder(config.usage.path.clone())
            .limits(config.usage.token_limits().with_env_overrides())
            .window(config.usage.window())
            .estimator(Arc::clone(&estimator))
            .open()?;

        info!(
            cache_dir = %config.cache.dir.display(),
            usage_path = %config.usage.path.display(),
            "huginn initialised"
        );

        Ok(Self {
            caches,
            records,
            estimator,
            usage: Arc::new(usage),
        })
    }

    /// Registry of durable stores.
    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    /// Ephemeral record cache shared by all producers.
    pub fn records(&self) -> &Arc<RecordCache> {
        &self.records
    }

    pub fn estimator(&self) -> &Arc<TokenEstimator> {
        &self.estimator
    }

    /// Token usage ledger.
    pub fn usage(&self) -> &Arc<TokenUsage> {
        &self.usage
    }

    /// A record cache handle scoped to `producer`.
    pub fn producer_cache(&self, producer: impl Into<String>) -> ProducerCache<Vec<Record>> {
        ProducerCache::new(producer, Arc::clone(&self.records))
    }
}
