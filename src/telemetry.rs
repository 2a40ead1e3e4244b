//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `engine`: engine name as reported by [`EmbeddingEngine::name`](crate::EmbeddingEngine::name)
//! - `reason`: why a cache entry left: "expired" | "fingerprint"
//! - `strategy`: strategy name (e.g. "balanced")

/// Total cache hits.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses (absent, expired or invalidated entries).
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total entries evicted to make room for an insertion.
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";

/// Total entries purged on lookup.
///
/// Labels: `reason` ("expired" | "fingerprint").
pub const CACHE_INVALIDATIONS_TOTAL: &str = "huginn_cache_invalidations_total";

/// Number of live cache entries.
pub const CACHE_ENTRIES: &str = "huginn_cache_entries";

/// Estimated bytes held by the cache.
pub const CACHE_BYTES: &str = "huginn_cache_bytes";

/// Batch size currently recommended by the controller.
pub const BATCH_SIZE: &str = "huginn_batch_size";

/// Engine call duration in seconds.
///
/// Labels: `engine`.
pub const ENGINE_CALL_DURATION_SECONDS: &str = "huginn_engine_call_duration_seconds";

/// Total failed engine calls.
///
/// Labels: `engine`.
pub const ENGINE_FAILURES_TOTAL: &str = "huginn_engine_failures_total";

/// Total retry attempts (not counting the initial call).
///
/// Labels: `engine`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total strategy switches during adaptive processing.
///
/// Labels: `strategy` (the strategy switched to).
pub const STRATEGY_CHANGES_TOTAL: &str = "huginn_strategy_changes_total";

/// System memory usage percent at the last snapshot.
pub const MEMORY_USAGE_PERCENT: &str = "huginn_memory_usage_percent";
