//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `cache`: which cache: "durable" or "ttl"
//! - `direction`: token direction: "input" or "output"
//! - `scope`: quota scope: "identity" or "system"

/// Total cache hits.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses (absent or expired).
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total successful durable-store writes.
pub const CACHE_WRITES_TOTAL: &str = "huginn_cache_writes_total";

/// Total TTL-cache entries removed by prefix invalidation.
pub const CACHE_INVALIDATIONS_TOTAL: &str = "huginn_cache_invalidations_total";

/// Total tokens recorded in the usage ledger.
///
/// Labels: `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "huginn_tokens_total";

/// Total log calls refused for exceeding a quota.
///
/// Labels: `scope` ("identity" | "system").
pub const QUOTA_REJECTIONS_TOTAL: &str = "huginn_quota_rejections_total";

/// Total token estimates that fell back to the character heuristic.
pub const TOKENIZER_FALLBACKS_TOTAL: &str = "huginn_tokenizer_fallbacks_total";
