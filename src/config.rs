//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (explicit; must exist)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//! 4. built-in defaults
//!
//! Environment variables then override individual values:
//!
//! | Variable | Field |
//! |---|---|
//! | `AGENT_DEFAULT_TOKEN_LIMIT` | `usage.agent_default_limit` |
//! | `SYSTEM_DAILY_TOKEN_LIMIT` | `usage.system_daily_limit` |
//! | `TOKEN_USAGE_PATH` | `usage.path` |
//! | `HUGINN_CACHE_DIR` | `cache.dir` |
//! | `HUGINN_CACHE_TTL_SECS` | `cache.ttl_secs` |
//!
//! Absent values take their defaults; present but invalid values are errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::TtlCacheConfig;
use crate::tokenizer::{DEFAULT_MODEL, EstimatorConfig};
use crate::usage::{DEFAULT_AGENT_LIMIT, DEFAULT_SYSTEM_LIMIT, TokenLimits};
use crate::validate::has_parent_traversal;
use crate::{HuginnError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub usage: UsageSettings,
    #[serde(default)]
    pub tokenizer: TokenizerSettings,
}

/// Durable and ephemeral cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory for per-alias store files (default: `data/cache`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Backing file of the `"default"` store (default:
    /// `{dir}/shared_cache.json`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_path: Option<PathBuf>,
    /// TTL of ephemeral record entries in seconds (default: 1800).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Capacity of the ephemeral record cache (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            default_path: None,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheSettings {
    /// Backing file of the default store, derived from `dir` unless set.
    pub fn default_store_path(&self) -> PathBuf {
        self.default_path
            .clone()
            .unwrap_or_else(|| self.dir.join(DEFAULT_STORE_FILE))
    }

    pub fn ttl_cache_config(&self) -> TtlCacheConfig {
        TtlCacheConfig::new()
            .max_entries(self.max_entries)
            .default_ttl(Duration::from_secs(self.ttl_secs))
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

const DEFAULT_STORE_FILE: &str = "shared_cache.json";

fn default_ttl_secs() -> u64 {
    1800
}

fn default_max_entries() -> u64 {
    10_000
}

/// Token usage ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSettings {
    /// Ledger file (default: `data/token_usage.json`).
    #[serde(default = "default_usage_path")]
    pub path: PathBuf,
    #[serde(default = "default_agent_limit")]
    pub agent_default_limit: u64,
    #[serde(default = "default_system_limit")]
    pub system_daily_limit: u64,
    /// Rolling window in hours (default: 24).
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            path: default_usage_path(),
            agent_default_limit: default_agent_limit(),
            system_daily_limit: default_system_limit(),
            window_hours: default_window_hours(),
        }
    }
}

impl UsageSettings {
    /// Ceilings from this section. Per-identity overrides are added by the
    /// caller.
    pub fn token_limits(&self) -> TokenLimits {
        TokenLimits::new(self.agent_default_limit, self.system_daily_limit)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_hours.saturating_mul(3600))
    }
}

fn default_usage_path() -> PathBuf {
    PathBuf::from("data/token_usage.json")
}

fn default_agent_limit() -> u64 {
    DEFAULT_AGENT_LIMIT
}

fn default_system_limit() -> u64 {
    DEFAULT_SYSTEM_LIMIT
}

fn default_window_hours() -> u64 {
    24
}

/// Token estimator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerSettings {
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Loaded tokenizers kept in memory (default: 16).
    #[serde(default = "default_max_tokenizers")]
    pub max_tokenizers: u64,
}

impl Default for TokenizerSettings {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            max_tokenizers: default_max_tokenizers(),
        }
    }
}

impl TokenizerSettings {
    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig::new()
            .default_model(self.default_model.clone())
            .max_tokenizers(self.max_tokenizers)
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokenizers() -> u64 {
    16
}

impl Config {
    /// Load configuration from the standard locations, apply environment
    /// overrides and validate.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::read(explicit_path)?;
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Read the first config file found, or defaults if there is none.
    ///
    /// Does not apply environment overrides.
    pub fn read(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply recognised environment variables from `vars`.
    ///
    /// Unrecognised variables are ignored; a recognised one with an
    /// unparseable value is an error.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "AGENT_DEFAULT_TOKEN_LIMIT" => self.usage.agent_default_limit = parse_var(key, value)?,
                "SYSTEM_DAILY_TOKEN_LIMIT" => self.usage.system_daily_limit = parse_var(key, value)?,
                "TOKEN_USAGE_PATH" => self.usage.path = PathBuf::from(value),
                "HUGINN_CACHE_DIR" => self.cache.dir = PathBuf::from(value),
                "HUGINN_CACHE_TTL_SECS" => self.cache.ttl_secs = parse_var(key, value)?,
                _ => continue,
            }
            debug!(variable = key, "applied environment override");
        }
        Ok(())
    }

    /// Reject values that would make the system unusable.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("usage.agent_default_limit", self.usage.agent_default_limit),
            ("usage.system_daily_limit", self.usage.system_daily_limit),
            ("usage.window_hours", self.usage.window_hours),
            ("cache.ttl_secs", self.cache.ttl_secs),
            ("cache.max_entries", self.cache.max_entries),
            ("tokenizer.max_tokenizers", self.tokenizer.max_tokenizers),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(HuginnError::Configuration(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        if self.usage.path.as_os_str().is_empty() {
            return Err(HuginnError::Configuration(
                "usage.path must not be empty".to_string(),
            ));
        }
        let paths = [
            ("usage.path", self.usage.path.clone()),
            ("cache.dir", self.cache.dir.clone()),
            ("cache.default_path", self.cache.default_store_path()),
        ];
        for (field, path) in paths {
            if has_parent_traversal(&path) {
                return Err(HuginnError::Configuration(format!(
                    "{field} must not contain '..': {path:?}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        HuginnError::Configuration(format!("invalid value for {key}: {value:?} ({e})"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.cache.dir, PathBuf::from("data/cache"));
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.usage.path, PathBuf::from("data/token_usage.json"));
        assert_eq!(config.usage.agent_default_limit, 10_000);
        assert_eq!(config.usage.system_daily_limit, 100_000);
        assert_eq!(config.usage.window(), Duration::from_secs(86_400));
        assert_eq!(config.tokenizer.default_model, "gpt-3.5-turbo");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [usage]
            agent_default_limit = 500
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.usage.agent_default_limit, 500);
        // Defaults preserved
        assert_eq!(config.usage.system_daily_limit, 100_000);
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [cache]
            dir = "/var/lib/huginn/cache"
            default_path = "/var/lib/huginn/cache/shared.json"
            ttl_secs = 60
            max_entries = 100

            [usage]
            path = "/var/lib/huginn/usage.json"
            agent_default_limit = 1000
            system_daily_limit = 5000
            window_hours = 12

            [tokenizer]
            default_model = "claude-3-haiku"
            max_tokenizers = 4
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.ttl_cache_config().default_ttl, Duration::from_secs(60));
        assert_eq!(config.usage.token_limits().system, 5000);
        assert_eq!(config.usage.window(), Duration::from_secs(12 * 3600));
        assert_eq!(config.tokenizer.estimator_config().max_tokenizers, 4);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_env_overrides([
                ("AGENT_DEFAULT_TOKEN_LIMIT", "2500"),
                ("SYSTEM_DAILY_TOKEN_LIMIT", " 9000 "),
                ("TOKEN_USAGE_PATH", "/tmp/usage.json"),
                ("HUGINN_CACHE_DIR", "/tmp/cache"),
                ("HUGINN_CACHE_TTL_SECS", "30"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.usage.agent_default_limit, 2500);
        assert_eq!(config.usage.system_daily_limit, 9000);
        assert_eq!(config.usage.path, PathBuf::from("/tmp/usage.json"));
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.cache.ttl_secs, 30);
    }

    #[test]
    fn cache_dir_override_moves_default_store() {
        let mut config = Config::default();
        assert_eq!(
            config.cache.default_store_path(),
            PathBuf::from("data/cache/shared_cache.json")
        );
        config
            .apply_env_overrides([("HUGINN_CACHE_DIR", "/tmp/cache")])
            .unwrap();
        assert_eq!(
            config.cache.default_store_path(),
            PathBuf::from("/tmp/cache/shared_cache.json")
        );
    }

    #[test]
    fn explicit_default_path_is_kept() {
        let toml = r#"
            [cache]
            default_path = "/srv/shared.json"
        "#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config
            .apply_env_overrides([("HUGINN_CACHE_DIR", "/tmp/cache")])
            .unwrap();
        assert_eq!(config.cache.default_store_path(), PathBuf::from("/srv/shared.json"));
    }

    #[test]
    fn unparseable_env_override_is_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides([("AGENT_DEFAULT_TOKEN_LIMIT", "plenty")])
            .unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
        assert!(err.to_string().contains("AGENT_DEFAULT_TOKEN_LIMIT"));
    }

    #[test]
    fn validate_rejects_zero() {
        let mut config = Config::default();
        config.usage.system_daily_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_parent_traversal() {
        let mut config = Config::default();
        config
            .apply_env_overrides([("TOKEN_USAGE_PATH", "data/../../etc/token_usage.json")])
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("usage.path"));

        let mut config = Config::default();
        config.cache.dir = PathBuf::from("../cache");
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::read(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tokenizer]\ndefault_model = \"gpt-4o\"\n").unwrap();
        let config = Config::read(Some(&path)).unwrap();
        assert_eq!(config.tokenizer.default_model, "gpt-4o");
    }

    #[test]
    fn malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[usage\n").unwrap();
        assert!(Config::read(Some(&path)).is_err());
    }
}
