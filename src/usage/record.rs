//! Per-identity usage records and their on-disk form.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::validate;

/// Token usage of one identity within the current window.
///
/// `total` is always `input + output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input: u64,
    pub output: u64,
    pub total: u64,
    pub last_updated: DateTime<Utc>,
}

impl UsageRecord {
    /// A zeroed record stamped `at`.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            input: 0,
            output: 0,
            total: 0,
            last_updated: at,
        }
    }

    /// Accumulate counts and restamp.
    pub(crate) fn add(&mut self, input: u64, output: u64, at: DateTime<Utc>) {
        self.input = self.input.saturating_add(input);
        self.output = self.output.saturating_add(output);
        self.total = self.input.saturating_add(self.output);
        self.last_updated = at;
    }
}

/// Record as found on disk. Counts may be negative or missing, and the
/// timestamp may lack an offset.
#[derive(Deserialize)]
struct StoredRecord {
    #[serde(default)]
    input: i64,
    #[serde(default)]
    output: i64,
    #[serde(default)]
    total: Option<i64>,
    last_updated: String,
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one.
///
/// Naive timestamps are host local time, which is how older ledgers were
/// written.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(local_to_utc)
        })
}

fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match naive.and_local_timezone(Local).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // skipped by a DST jump
        None => naive.and_utc(),
    }
}

/// Turn a loaded ledger file into records.
///
/// Entries with an invalid identity, an unreadable shape or an unparseable
/// timestamp are dropped. Negative counts are clamped and a stale `total` is
/// recomputed.
pub(crate) fn decode_records(raw: BTreeMap<String, Value>) -> BTreeMap<String, UsageRecord> {
    let mut records = BTreeMap::new();
    for (identity, value) in raw {
        if !validate::is_safe_name(&identity) {
            warn!(identity = ?identity, "dropping usage record with invalid identity");
            continue;
        }
        let stored: StoredRecord = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(identity = %identity, error = %e, "dropping malformed usage record");
                continue;
            }
        };
        let Some(last_updated) = parse_timestamp(&stored.last_updated) else {
            warn!(
                identity = %identity,
                timestamp = %stored.last_updated,
                "dropping usage record with unparseable timestamp"
            );
            continue;
        };
        let (input, output) = validate::clamp_counts(stored.input, stored.output);
        let total = input.saturating_add(output);
        if stored.total.is_some_and(|t| t != total as i64) {
            warn!(
                identity = %identity,
                stored = ?stored.total,
                computed = total,
                "usage total disagrees with input + output, recomputing"
            );
        }
        records.insert(
            identity,
            UsageRecord {
                input,
                output,
                total,
                last_updated,
            },
        );
    }
    records
}
