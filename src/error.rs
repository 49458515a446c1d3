//! Huginn error types

use std::path::PathBuf;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Persistence errors
    /// A write-side failure (directory creation, temp file, sync, rename).
    ///
    /// Fatal: the durability guarantee of the store or ledger is lost.
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Quota errors
    #[error("token limit exceeded for '{identity}' ({attempted}/{limit})")]
    IdentityQuotaExceeded {
        identity: String,
        attempted: u64,
        limit: u64,
    },

    #[error("system-wide token limit exceeded ({attempted}/{limit})")]
    SystemQuotaExceeded { attempted: u64, limit: u64 },

    // Tokenizer errors
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

impl HuginnError {
    /// Whether this is one of the two quota rejections.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(
            self,
            HuginnError::IdentityQuotaExceeded { .. } | HuginnError::SystemQuotaExceeded { .. }
        )
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Quota rejections are deliberately not transient: the caller decides
    /// whether to wait for the window to roll over.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::Persistence { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HuginnError::Persistence {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
