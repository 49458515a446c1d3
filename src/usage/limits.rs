//! Token ceilings and per-identity overrides.

use std::collections::HashMap;

use tracing::warn;

/// Suffix of per-identity override variables, e.g. `AGENT1_TOKEN_LIMIT`.
pub const OVERRIDE_SUFFIX: &str = "_TOKEN_LIMIT";

/// Default per-identity ceiling.
pub const DEFAULT_AGENT_LIMIT: u64 = 10_000;

/// Default system-wide ceiling.
pub const DEFAULT_SYSTEM_LIMIT: u64 = 100_000;

/// Token ceilings applied within the rolling window.
///
/// Overrides are kept as raw strings and validated on lookup so a bad value
/// only affects the identity it names.
///
/// ```rust
/// # use huginn::usage::TokenLimits;
/// let limits = TokenLimits::new(10_000, 100_000).with_override("agent2", "500");
/// assert_eq!(limits.limit_for("agent2"), 500);
/// assert_eq!(limits.limit_for("agent1"), 10_000);
/// ```
#[derive(Debug, Clone)]
pub struct TokenLimits {
    /// Ceiling for identities without an override.
    pub agent_default: u64,
    /// Ceiling on the sum over all identities.
    pub system: u64,
    overrides: HashMap<String, String>,
}

impl Default for TokenLimits {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_LIMIT, DEFAULT_SYSTEM_LIMIT)
    }
}

impl TokenLimits {
    pub fn new(agent_default: u64, system: u64) -> Self {
        Self {
            agent_default,
            system,
            overrides: HashMap::new(),
        }
    }

    /// Capture every `*_TOKEN_LIMIT` variable from the process environment.
    ///
    /// Called once at startup; later changes to the environment are not seen.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(std::env::vars())
    }

    /// Capture `*_TOKEN_LIMIT` entries from an arbitrary variable source.
    pub fn with_overrides_from<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.into();
            if key.ends_with(OVERRIDE_SUFFIX) {
                self.overrides.insert(key, value.into());
            }
        }
        self
    }

    /// Set a raw override for one identity.
    pub fn with_override(mut self, identity: &str, limit: impl Into<String>) -> Self {
        self.overrides.insert(override_key(identity), limit.into());
        self
    }

    /// Ceiling for `identity`.
    ///
    /// A non-positive or unparseable override falls back to the default with
    /// a warning.
    pub fn limit_for(&self, identity: &str) -> u64 {
        let key = override_key(identity);
        let Some(raw) = self.overrides.get(&key) else {
            return self.agent_default;
        };
        match raw.trim().parse::<i64>() {
            Ok(limit) if limit > 0 => limit as u64,
            _ => {
                warn!(
                    identity,
                    variable = %key,
                    value = %raw,
                    default = self.agent_default,
                    "invalid token limit override, using default"
                );
                self.agent_default
            }
        }
    }
}

/// Override variable name for an identity: `{IDENTITY}_TOKEN_LIMIT`.
pub fn override_key(identity: &str) -> String {
    format!("{}{OVERRIDE_SUFFIX}", identity.to_ascii_uppercase())
}
