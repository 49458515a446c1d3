//! Input validation for identities, token counts and configured paths.

use std::path::{Component, Path};

use serde_json::Value;
use tracing::warn;

/// Whether `name` is a safe identifier: non-empty, ASCII letters, digits,
/// `_` and `-` only.
///
/// Identities end up in log lines, file names and environment-variable
/// names, so anything else is refused.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Validate an identity, logging a warning when it is refused.
pub(crate) fn check_identity(identity: &str) -> bool {
    if is_safe_name(identity) {
        true
    } else {
        warn!(identity = ?identity, "invalid identity format");
        false
    }
}

/// Clamp a pair of raw token counts to non-negative values.
///
/// Each field is clamped independently; a warning is logged if either was
/// negative.
pub fn clamp_counts(input: i64, output: i64) -> (u64, u64) {
    if input < 0 || output < 0 {
        warn!(input, output, "negative token values received, clamping to 0");
    }
    (input.max(0) as u64, output.max(0) as u64)
}

/// Read a JSON value as a token count.
///
/// Integers pass through, floats are truncated, numeric strings are parsed.
/// Anything else is `None`. The result is not yet clamped.
pub fn parse_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

/// Whether `path` climbs out of its base with a `..` component.
pub fn has_parent_traversal(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}
