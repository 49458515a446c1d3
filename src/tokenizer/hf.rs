//! HuggingFace tokenizers implementation.

use std::path::Path;
use std::sync::Arc;

use super::{TokenizerLoader, TokenizerProvider, TokenizerSource};
use crate::{HuginnError, Result};

/// HuggingFace tokenizers implementation.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    /// Load tokenizer from HuggingFace Hub.
    ///
    /// Downloads the tokenizer if not cached locally.
    pub fn from_hub(repo_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| HuginnError::Tokenizer(format!("failed to initialize HF API: {e}")))?;

        let tokenizer_path = api.model(repo_id.to_string()).get("tokenizer.json").map_err(|e| {
            HuginnError::Tokenizer(format!("failed to download tokenizer from {repo_id}: {e}"))
        })?;

        Self::from_file(&tokenizer_path)
    }

    /// Load tokenizer from local file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            HuginnError::Tokenizer(format!(
                "failed to load tokenizer from {}: {e}",
                path.display()
            ))
        })?;

        Ok(Self { inner })
    }
}

impl TokenizerProvider for HfTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.tokenize(text)?.len())
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| HuginnError::Tokenizer(format!("tokenization failed: {e}")))?;

        Ok(encoding.get_ids().to_vec())
    }
}

/// Loader for hub-hosted and local `tokenizer.json` files.
pub struct HfLoader;

impl TokenizerLoader for HfLoader {
    fn load(&self, source: &TokenizerSource) -> Result<Arc<dyn TokenizerProvider>> {
        let tokenizer = match source {
            TokenizerSource::HuggingFace { repo_id } => HfTokenizer::from_hub(repo_id)?,
            TokenizerSource::Local { path } => HfTokenizer::from_file(path)?,
            TokenizerSource::Alias { target } => {
                return Err(HuginnError::Tokenizer(format!(
                    "unresolved tokenizer alias: {target}"
                )));
            }
        };
        Ok(Arc::new(tokenizer))
    }
}
