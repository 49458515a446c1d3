//! Token usage ledger with per-identity and system-wide quotas.
//!
//! [`TokenUsage`] records input/output token counts per identity within a
//! rolling window, refuses logs that would push an identity or the whole
//! system over its ceiling, and persists the ledger as JSON after every
//! accepted change.
//!
//! ```rust,no_run
//! # use huginn::usage::{TokenLimits, TokenUsage};
//! # fn main() -> huginn::Result<()> {
//! let usage = TokenUsage::builder("data/token_usage.json")
//!     .limits(TokenLimits::default().with_env_overrides())
//!     .open()?;
//!
//! let receipt = usage.log("agent1", 120, 480)?.into_result()?;
//! assert_eq!(receipt.usage.total, 600);
//! # Ok(())
//! # }
//! ```
//!
//! Records untouched for longer than the window are deleted outright; there
//! is no sliding decay.

mod limits;
mod outcome;
mod record;

pub use limits::{DEFAULT_AGENT_LIMIT, DEFAULT_SYSTEM_LIMIT, TokenLimits, override_key};
pub use outcome::{LogOutcome, LogReceipt};
pub use record::UsageRecord;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::tokenizer::{EstimatorConfig, TokenEstimator};
use crate::{HuginnError, Result, persist, telemetry, validate};

/// Default rolling window: 24 hours.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

type Records = BTreeMap<String, UsageRecord>;

/// Builder for [`TokenUsage`].
pub struct TokenUsageBuilder {
    path: PathBuf,
    limits: TokenLimits,
    window: Duration,
    estimator: Option<Arc<TokenEstimator>>,
}

impl TokenUsageBuilder {
    /// Quota ceilings. Default: [`TokenLimits::default`], no overrides.
    pub fn limits(mut self, limits: TokenLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Staleness threshold for records. Default: 24 hours.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Estimator used by [`TokenUsage::estimate`].
    pub fn estimator(mut self, estimator: Arc<TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Create the parent directory, load the ledger file and prune it.
    ///
    /// A missing or corrupt file starts an empty ledger. Failing to create
    /// the directory is fatal.
    pub fn open(self) -> Result<TokenUsage> {
        let window = TimeDelta::from_std(self.window).map_err(|_| {
            HuginnError::Configuration(format!("usage window out of range: {:?}", self.window))
        })?;
        persist::ensure_parent_dir(&self.path)?;

        let mut records = persist::load_json::<BTreeMap<String, Value>>(&self.path)
            .map(record::decode_records)
            .unwrap_or_default();
        let pruned = prune(&mut records, window, Utc::now());
        info!(
            path = %self.path.display(),
            identities = records.len(),
            pruned,
            "loaded token usage ledger"
        );

        let usage = TokenUsage {
            path: self.path,
            limits: self.limits,
            window,
            estimator: self
                .estimator
                .unwrap_or_else(|| Arc::new(TokenEstimator::new(&EstimatorConfig::default()))),
            records: Mutex::new(records),
        };
        if pruned > 0 {
            usage.persist_best_effort(&usage.lock());
        }
        Ok(usage)
    }
}

/// Persistent token usage ledger.
///
/// One mutex guards the whole ledger; prune, quota check, update and write
/// happen under a single acquisition, so concurrent logs never interleave.
pub struct TokenUsage {
    path: PathBuf,
    limits: TokenLimits,
    window: TimeDelta,
    estimator: Arc<TokenEstimator>,
    records: Mutex<Records>,
}

impl TokenUsage {
    pub fn builder(path: impl Into<PathBuf>) -> TokenUsageBuilder {
        TokenUsageBuilder {
            path: path.into(),
            limits: TokenLimits::default(),
            window: DEFAULT_WINDOW,
            estimator: None,
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> &TokenLimits {
        &self.limits
    }

    /// Ceiling for `identity`, honouring overrides.
    pub fn limit_for(&self, identity: &str) -> u64 {
        self.limits.limit_for(identity)
    }

    pub fn estimator(&self) -> &Arc<TokenEstimator> {
        &self.estimator
    }

    /// Record token usage for `identity`.
    ///
    /// Negative counts are clamped to zero. Quota rejections and invalid
    /// identities are reported through [`LogOutcome`] and leave the ledger
    /// unchanged. `Err` means the update could not be persisted; memory is
    /// rolled back in that case too.
    pub fn log(&self, identity: &str, input_tokens: i64, output_tokens: i64) -> Result<LogOutcome> {
        if !validate::check_identity(identity) {
            return Ok(LogOutcome::InvalidIdentity {
                identity: identity.to_string(),
            });
        }
        let (input, output) = validate::clamp_counts(input_tokens, output_tokens);
        let added = input.saturating_add(output);
        let now = Utc::now();

        let mut records = self.lock();
        let pruned = prune(&mut records, self.window, now);

        let limit = self.limits.limit_for(identity);
        let current = records.get(identity).map_or(0, |r| r.total);
        let attempted = current.saturating_add(added);
        if attempted > limit {
            error!(identity, attempted, limit, "token limit exceeded");
            metrics::counter!(telemetry::QUOTA_REJECTIONS_TOTAL, "scope" => "identity").increment(1);
            if pruned > 0 {
                self.persist_best_effort(&records);
            }
            return Ok(LogOutcome::IdentityQuotaExceeded {
                identity: identity.to_string(),
                attempted,
                limit,
            });
        }

        let system_limit = self.limits.system;
        let system_attempted = system_total(&records).saturating_add(added);
        if system_attempted > system_limit {
            error!(
                identity,
                attempted = system_attempted,
                limit = system_limit,
                "system-wide token limit exceeded"
            );
            metrics::counter!(telemetry::QUOTA_REJECTIONS_TOTAL, "scope" => "system").increment(1);
            if pruned > 0 {
                self.persist_best_effort(&records);
            }
            return Ok(LogOutcome::SystemQuotaExceeded {
                attempted: system_attempted,
                limit: system_limit,
            });
        }

        let previous = records.get(identity).cloned();
        let record = records
            .entry(identity.to_string())
            .or_insert_with(|| UsageRecord::empty(now));
        record.add(input, output, now);
        let usage = record.clone();

        if let Err(e) = persist::write_json_atomic(&self.path, &*records) {
            error!(identity, path = %self.path.display(), error = %e, "failed to persist token usage");
            match previous {
                Some(previous) => records.insert(identity.to_string(), previous),
                None => records.remove(identity),
            };
            return Err(e);
        }

        metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "input").increment(input);
        metrics::counter!(telemetry::TOKENS_TOTAL, "direction" => "output").increment(output);
        info!(
            identity,
            input,
            output,
            total = usage.total,
            limit,
            "recorded token usage"
        );

        let identity_near_limit = outcome::near_limit(usage.total, limit);
        if identity_near_limit {
            warn!(identity, total = usage.total, limit, "identity approaching token limit");
        }
        let system_near_limit = outcome::near_limit(system_attempted, system_limit);
        if system_near_limit {
            warn!(total = system_attempted, limit = system_limit, "system approaching token limit");
        }

        Ok(LogOutcome::Recorded(LogReceipt {
            usage,
            identity_near_limit,
            system_near_limit,
        }))
    }

    /// Record usage from a chat-completion response body.
    ///
    /// Reads `usage.prompt_tokens` and `usage.completion_tokens`; numeric
    /// strings are accepted. If the `usage` object is missing, or either
    /// field is missing or not a number, the whole object is treated as
    /// malformed and zero tokens are recorded.
    pub fn log_from_response(&self, identity: &str, response: &Value) -> Result<LogOutcome> {
        let counts = response.get("usage").and_then(Value::as_object).and_then(|usage| {
            let input = usage.get("prompt_tokens").and_then(validate::parse_count)?;
            let output = usage.get("completion_tokens").and_then(validate::parse_count)?;
            Some((input, output))
        });
        let (input, output) = counts.unwrap_or_else(|| {
            error!(
                identity,
                usage = ?response.get("usage"),
                "malformed usage in response, recording zero tokens"
            );
            (0, 0)
        });
        self.log(identity, input, output)
    }

    /// Usage of one identity within the window.
    ///
    /// Unknown and invalid identities get a zeroed record stamped now.
    pub fn get_usage(&self, identity: &str) -> UsageRecord {
        let now = Utc::now();
        let mut records = self.lock();
        if prune(&mut records, self.window, now) > 0 {
            self.persist_best_effort(&records);
        }
        records
            .get(identity)
            .cloned()
            .unwrap_or_else(|| UsageRecord::empty(now))
    }

    /// Sum over all identities within the window, stamped now.
    pub fn get_total_usage(&self) -> UsageRecord {
        let now = Utc::now();
        let mut records = self.lock();
        if prune(&mut records, self.window, now) > 0 {
            self.persist_best_effort(&records);
        }
        let mut total = UsageRecord::empty(now);
        for record in records.values() {
            total.add(record.input, record.output, now);
        }
        total
    }

    /// Every live record, keyed by identity.
    pub fn all_usage(&self) -> BTreeMap<String, UsageRecord> {
        let mut records = self.lock();
        if prune(&mut records, self.window, Utc::now()) > 0 {
            self.persist_best_effort(&records);
        }
        records.clone()
    }

    /// Drop every record and persist the empty ledger.
    pub fn reset(&self) -> Result<()> {
        let mut records = self.lock();
        let previous = std::mem::take(&mut *records);
        if let Err(e) = persist::write_json_atomic(&self.path, &*records) {
            *records = previous;
            return Err(e);
        }
        info!(path = %self.path.display(), "reset token usage ledger");
        Ok(())
    }

    /// Estimate the token count of `text` with the default model.
    pub fn estimate(&self, text: &str) -> usize {
        self.estimator.estimate_default(text)
    }

    /// Estimate the token count of `text` for `model`.
    pub fn estimate_with_model(&self, text: &str, model: &str) -> usize {
        self.estimator.estimate(text, model)
    }

    fn persist_best_effort(&self, records: &Records) {
        if let Err(e) = persist::write_json_atomic(&self.path, records) {
            warn!(path = %self.path.display(), error = %e, "failed to persist pruned token usage");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remove records last updated more than `window` before `now`.
fn prune(records: &mut Records, window: TimeDelta, now: DateTime<Utc>) -> usize {
    let before = records.len();
    records.retain(|identity, record| {
        let fresh = now.signed_duration_since(record.last_updated) <= window;
        if !fresh {
            debug!(identity = %identity, last_updated = %record.last_updated, "pruning stale usage record");
        }
        fresh
    });
    before - records.len()
}

fn system_total(records: &Records) -> u64 {
    records
        .values()
        .fold(0u64, |acc, r| acc.saturating_add(r.total))
}
