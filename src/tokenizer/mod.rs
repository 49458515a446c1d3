//! Token estimation for quota accounting.
//!
//! [`TokenEstimator`] maps model names to tokenizers, loads them lazily
//! through a [`TokenizerLoader`] and keeps a bounded cache of the loaded
//! ones. When no tokenizer can be used (unknown model, load failure, no
//! loader configured) it falls back to a character heuristic: one token per
//! four characters.

#[cfg(feature = "hf-tokenizers")]
mod hf;

#[cfg(feature = "hf-tokenizers")]
pub use hf::{HfLoader, HfTokenizer};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{HuginnError, Result};

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Trait for tokenizer implementations.
pub trait TokenizerProvider: Send + Sync {
    /// Count tokens in the given text.
    fn count_tokens(&self, text: &str) -> Result<usize>;

    /// Tokenize text into token IDs.
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;
}

/// Loads a tokenizer from a resolved source.
pub trait TokenizerLoader: Send + Sync {
    fn load(&self, source: &TokenizerSource) -> Result<Arc<dyn TokenizerProvider>>;
}

/// Source for a tokenizer model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerSource {
    /// Load from HuggingFace Hub repository.
    HuggingFace { repo_id: String },
    /// Load from local file path.
    Local { path: PathBuf },
    /// Alias to another model's tokenizer.
    Alias { target: String },
}

/// Configuration for a [`TokenEstimator`].
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Model used by [`TokenEstimator::estimate_default`].
    pub default_model: String,
    /// Maximum number of loaded tokenizers kept in memory. Default: 16.
    pub max_tokenizers: u64,
    /// How long a failed load is remembered before retrying. Default: 10 minutes.
    pub failure_ttl: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            max_tokenizers: 16,
            failure_ttl: Duration::from_secs(600),
        }
    }
}

impl EstimatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn max_tokenizers(mut self, n: u64) -> Self {
        self.max_tokenizers = n;
        self
    }

    pub fn failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }
}

/// Character-count heuristic: one token per four characters.
pub fn fallback_estimate(text: &str) -> usize {
    text.chars().count() / 4
}

/// Estimates token counts, preferring a model's real tokenizer.
///
/// Safe to share behind an `Arc`; the tokenizer cache is internally
/// synchronised.
pub struct TokenEstimator {
    default_model: String,
    model_mappings: HashMap<String, TokenizerSource>,
    loader: Option<Arc<dyn TokenizerLoader>>,
    tokenizers: Cache<String, Arc<dyn TokenizerProvider>>,
    failures: Cache<String, String>,
}

impl TokenEstimator {
    /// Create an estimator with default model mappings.
    ///
    /// With the `hf-tokenizers` feature the HuggingFace loader is installed;
    /// otherwise every estimate uses the character heuristic until a loader
    /// is supplied via [`with_loader`](Self::with_loader).
    pub fn new(config: &EstimatorConfig) -> Self {
        let estimator = Self::without_loader(config);
        #[cfg(feature = "hf-tokenizers")]
        let estimator = estimator.with_loader(Arc::new(HfLoader));
        estimator
    }

    /// Create an estimator that always uses the character heuristic.
    pub fn without_loader(config: &EstimatorConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            model_mappings: default_mappings(),
            loader: None,
            tokenizers: Cache::new(config.max_tokenizers),
            failures: Cache::builder()
                .max_capacity(1_000)
                .time_to_live(config.failure_ttl)
                .build(),
        }
    }

    /// Replace the tokenizer loader.
    pub fn with_loader(mut self, loader: Arc<dyn TokenizerLoader>) -> Self {
        self.loader = Some(loader);
        self.tokenizers.invalidate_all();
        self.failures.invalidate_all();
        self
    }

    /// Register a custom model → tokenizer mapping.
    ///
    /// This allows users to override default mappings or add new ones.
    pub fn register(&mut self, model_pattern: impl Into<String>, source: TokenizerSource) {
        self.model_mappings.insert(model_pattern.into(), source);
    }

    /// Model used by [`estimate_default`](Self::estimate_default).
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Estimate the token count of `text` for `model`.
    ///
    /// Never fails: falls back to [`fallback_estimate`] when the model's
    /// tokenizer is unavailable. Empty text is 0.
    pub fn estimate(&self, text: &str, model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.count_tokens(text, model) {
            Ok(count) => count,
            Err(e) => {
                debug!(model, error = %e, "using character-based token estimate");
                metrics::counter!(telemetry::TOKENIZER_FALLBACKS_TOTAL).increment(1);
                fallback_estimate(text)
            }
        }
    }

    /// Estimate with the configured default model.
    pub fn estimate_default(&self, text: &str) -> usize {
        self.estimate(text, &self.default_model)
    }

    /// Count tokens with the model's tokenizer, without falling back.
    pub fn count_tokens(&self, text: &str, model: &str) -> Result<usize> {
        let provider = self.get_or_load_tokenizer(model)?;
        provider.count_tokens(text)
    }

    /// Number of tokenizers currently cached.
    pub fn cached_tokenizers(&self) -> u64 {
        self.tokenizers.run_pending_tasks();
        self.tokenizers.entry_count()
    }

    /// Get or lazily load a tokenizer for the given model.
    fn get_or_load_tokenizer(&self, model: &str) -> Result<Arc<dyn TokenizerProvider>> {
        // Fast path: already loaded
        if let Some(provider) = self.tokenizers.get(model) {
            return Ok(provider);
        }
        if let Some(reason) = self.failures.get(model) {
            return Err(HuginnError::Tokenizer(reason));
        }
        let Some(loader) = &self.loader else {
            return Err(HuginnError::Tokenizer(
                "no tokenizer loader configured".to_string(),
            ));
        };

        let source = self.resolve_source(model)?;
        // Concurrent callers for the same model share one load.
        self.tokenizers
            .try_get_with(model.to_string(), || loader.load(&source))
            .map_err(|e| {
                warn!(model, error = %e, "failed to load tokenizer");
                let reason = e.to_string();
                self.failures.insert(model.to_string(), reason.clone());
                HuginnError::Tokenizer(reason)
            })
    }

    /// Resolve model name to tokenizer source.
    ///
    /// Exact match first, then the longest registered prefix. Aliases are
    /// followed; a cycle is an error.
    pub fn resolve_source(&self, model: &str) -> Result<TokenizerSource> {
        let mut seen = HashSet::new();
        let mut current = model;
        loop {
            if !seen.insert(current) {
                return Err(HuginnError::Tokenizer(format!(
                    "alias cycle detected while resolving {model}"
                )));
            }
            let source = self.lookup(current).ok_or_else(|| {
                HuginnError::Tokenizer(format!("no tokenizer configured for model: {current}"))
            })?;
            match source {
                TokenizerSource::Alias { target } => current = target,
                other => return Ok(other.clone()),
            }
        }
    }

    fn lookup(&self, model: &str) -> Option<&TokenizerSource> {
        if let Some(source) = self.model_mappings.get(model) {
            return Some(source);
        }
        self.model_mappings
            .iter()
            .filter(|(pattern, _)| model.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, source)| source)
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(&EstimatorConfig::default())
    }
}

/// Default mappings for common model families.
fn default_mappings() -> HashMap<String, TokenizerSource> {
    let hub = |repo_id: &str| TokenizerSource::HuggingFace {
        repo_id: repo_id.to_string(),
    };
    HashMap::from([
        ("gpt-3.5".to_string(), hub("Xenova/gpt-3.5-turbo")),
        ("gpt-4".to_string(), hub("Xenova/gpt-4")),
        ("gpt-4o".to_string(), hub("Xenova/gpt-4o")),
        ("claude".to_string(), hub("Xenova/claude-tokenizer")),
        ("llama".to_string(), hub("meta-llama/Llama-3.2-1B")),
        (
            "meta-llama".to_string(),
            TokenizerSource::Alias {
                target: "llama".to_string(),
            },
        ),
        ("mistral".to_string(), hub("mistralai/Mistral-7B-v0.1")),
    ])
}
