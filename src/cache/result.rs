//! Embedding result cache with value-scored eviction.
//!
//! [`ResultCache`] stores one [`EmbeddingResult`] per cache key (identity,
//! content and metadata) and enforces two budgets: an entry count and an estimated byte size. The
//! estimate is the `serde_json` length of the stored result plus the key.
//!
//! # Lookup
//!
//! A lookup misses when the entry is absent, older than the TTL, or (with
//! content validation on) its fingerprint no longer matches the record.
//! Expired and drifted entries are purged on the spot.
//!
//! # Eviction
//!
//! Eviction runs only when an insertion would exceed a budget. Each entry
//! is scored as
//!
//! ```text
//! recency   = (now - last_access_at) / ttl
//! frequency = 1 / max(1, access_count)
//! age       = (now - inserted_at) / ttl
//! total     = recency + frequency + age
//! ```
//!
//! and the entry with the **highest** total goes first: stale, rarely hit,
//! old. Ties fall to the oldest insertion.
//!
//! # Failure policy
//!
//! Fail-open. Hashing, serialization and lock failures are logged and
//! degrade to a miss or a skipped insert; callers never see them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::key::{cache_key, content_fingerprint};
use super::stats::{AccessTimings, CacheCounters, CacheStats};
use crate::config::duration_ms;
use crate::telemetry;
use crate::types::{EmbeddingResult, WorkRecord};

/// Configuration for the result cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(50_000)
///     .ttl(Duration::from_secs(6 * 3600));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: usize,
    /// Byte budget for stored results. Default: 100 MiB.
    pub max_size_bytes: usize,
    /// Time-to-live for cached entries. Default: 1 hour.
    #[serde(rename = "ttl_ms", with = "duration_ms")]
    pub ttl: Duration,
    /// Recompute the content fingerprint on every lookup. Default: true.
    pub enable_content_validation: bool,
    /// Hit ratio under which the stats refresh warns. Default: 0.5.
    pub hit_ratio_threshold: f64,
    /// Expired-entry sweep period. Default: 5 minutes.
    #[serde(rename = "maintenance_interval_ms", with = "duration_ms")]
    pub maintenance_interval: Duration,
    /// Stats refresh period. Default: 30 seconds.
    #[serde(rename = "stats_interval_ms", with = "duration_ms")]
    pub stats_interval: Duration,
    /// Requests needed before a low hit ratio is worth a warning. Default: 100.
    pub min_requests_for_warning: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_size_bytes: 100 * 1024 * 1024,
            ttl: Duration::from_secs(3600),
            enable_content_validation: true,
            hit_ratio_threshold: 0.5,
            maintenance_interval: Duration::from_secs(300),
            stats_interval: Duration::from_secs(30),
            min_requests_for_warning: 100,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    pub fn max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn content_validation(mut self, enabled: bool) -> Self {
        self.enable_content_validation = enabled;
        self
    }

    pub fn hit_ratio_threshold(mut self, threshold: f64) -> Self {
        self.hit_ratio_threshold = threshold;
        self
    }

    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}

/// A stored result and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: EmbeddingResult,
    pub fingerprint: String,
    pub inserted_at: Instant,
    pub access_count: u64,
    pub last_access_at: Instant,
    pub size_bytes: usize,
}

/// Eviction score breakdown for one entry. Higher totals are evicted first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionScore {
    pub recency: f64,
    pub frequency: f64,
    pub age: f64,
    pub total: f64,
}

impl CacheEntry {
    pub fn eviction_score(&self, now: Instant, ttl: Duration) -> EvictionScore {
        let ttl_secs = ttl.as_secs_f64().max(f64::EPSILON);
        let recency = now.saturating_duration_since(self.last_access_at).as_secs_f64() / ttl_secs;
        let frequency = 1.0 / self.access_count.max(1) as f64;
        let age = now.saturating_duration_since(self.inserted_at).as_secs_f64() / ttl_secs;
        EvictionScore {
            recency,
            frequency,
            age,
            total: recency + frequency + age,
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

enum Lookup {
    Absent,
    Stale(&'static str),
    Live,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, CacheEntry>,
    current_bytes: usize,
}

impl Store {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Result cache. Owned by the orchestrator; share it with `Arc`.
pub struct ResultCache {
    store: Mutex<Store>,
    config: CacheConfig,
    counters: CacheCounters,
    timings: AccessTimings,
    maintenance: Mutex<Option<CancellationToken>>,
}

impl ResultCache {
    pub fn new(mut config: CacheConfig) -> Self {
        config.max_entries = config.max_entries.max(1);
        let timings = AccessTimings::new(
            config.max_entries as u64,
            config.ttl.max(Duration::from_secs(1)),
        );
        Self {
            store: Mutex::new(Store::default()),
            config,
            counters: CacheCounters::default(),
            timings,
            maintenance: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up the cached result for `record`.
    ///
    /// Returns a copy; the stored entry cannot be modified through it.
    pub fn get(&self, record: &WorkRecord) -> Option<EmbeddingResult> {
        let start = Instant::now();
        let key = match cache_key(record) {
            Ok(key) => key,
            Err(e) => {
                warn!(id = %record.id, error = %e, "cache key derivation failed, treating as miss");
                self.record_miss();
                return None;
            }
        };
        let found = self.lookup(&key, record);
        self.timings.record(&key, start.elapsed());
        found
    }

    fn lookup(&self, key: &str, record: &WorkRecord) -> Option<EmbeddingResult> {
        let fingerprint = self
            .config
            .enable_content_validation
            .then(|| content_fingerprint(record));

        let Some(mut store) = self.lock_store() else {
            self.record_miss();
            return None;
        };
        let now = Instant::now();

        let state = match store.entries.get(key) {
            None => Lookup::Absent,
            Some(entry) if entry.is_expired(now, self.config.ttl) => Lookup::Stale("expired"),
            Some(entry) if fingerprint.as_ref().is_some_and(|fp| *fp != entry.fingerprint) => {
                Lookup::Stale("fingerprint")
            }
            Some(_) => Lookup::Live,
        };

        match state {
            Lookup::Absent => {
                drop(store);
                self.record_miss();
                return None;
            }
            Lookup::Stale(reason) => {
                store.remove(key);
                self.publish_size(&store);
                drop(store);
                debug!(id = %record.id, reason, "purged stale cache entry");
                self.counters.record_invalidation();
                metrics::counter!(telemetry::CACHE_INVALIDATIONS_TOTAL, "reason" => reason)
                    .increment(1);
                self.record_miss();
                return None;
            }
            Lookup::Live => {}
        }

        let entry = store.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_access_at = now;
        let result = entry.result.clone();
        drop(store);

        self.counters.record_hit();
        metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
        Some(result)
    }

    /// Store `result` for `record`, evicting as needed.
    ///
    /// A result larger than the whole byte budget is not cached.
    pub fn set(&self, record: &WorkRecord, result: &EmbeddingResult) {
        let key = match cache_key(record) {
            Ok(key) => key,
            Err(e) => {
                warn!(id = %record.id, error = %e, "cache key derivation failed, skipping insert");
                return;
            }
        };
        let size_bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes.len() + key.len(),
            Err(e) => {
                warn!(id = %record.id, error = %e, "result size estimate failed, skipping insert");
                return;
            }
        };
        if size_bytes > self.config.max_size_bytes {
            warn!(
                id = %record.id,
                size_bytes,
                max_size_bytes = self.config.max_size_bytes,
                "result exceeds cache byte budget, not cached"
            );
            return;
        }
        let fingerprint = content_fingerprint(record);

        let Some(mut store) = self.lock_store() else {
            return;
        };
        let now = Instant::now();
        // Replacing an entry must not count against the budget.
        store.remove(&key);
        self.ensure_capacity(&mut store, size_bytes, now);

        store.entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                fingerprint,
                inserted_at: now,
                access_count: 0,
                last_access_at: now,
                size_bytes,
            },
        );
        store.current_bytes += size_bytes;
        self.publish_size(&store);
    }

    /// Evict highest-scoring entries until `new_size` more bytes and one
    /// more entry fit, or the store is empty.
    fn ensure_capacity(&self, store: &mut Store, new_size: usize, now: Instant) {
        while !store.entries.is_empty()
            && (store.entries.len() + 1 > self.config.max_entries
                || store.current_bytes + new_size > self.config.max_size_bytes)
        {
            let Some(victim) = self.select_victim(store, now) else {
                break;
            };
            if let Some(entry) = store.remove(&victim) {
                debug!(
                    id = %entry.result.id,
                    access_count = entry.access_count,
                    "evicted cache entry"
                );
                self.counters.record_eviction();
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(1);
            }
        }
    }

    fn select_victim(&self, store: &Store, now: Instant) -> Option<String> {
        store
            .entries
            .iter()
            .max_by(|(_, a), (_, b)| {
                let sa = a.eviction_score(now, self.config.ttl).total;
                let sb = b.eviction_score(now, self.config.ttl).total;
                sa.total_cmp(&sb)
                    .then_with(|| b.inserted_at.cmp(&a.inserted_at))
            })
            .map(|(key, _)| key.clone())
    }

    /// Drop the entry for `record`, if any.
    pub fn remove(&self, record: &WorkRecord) -> bool {
        let Ok(key) = cache_key(record) else {
            return false;
        };
        let Some(mut store) = self.lock_store() else {
            return false;
        };
        let removed = store.remove(&key).is_some();
        self.publish_size(&store);
        removed
    }

    /// Whether an entry exists for `record`, ignoring TTL and content.
    /// Does not count as a request.
    pub fn contains(&self, record: &WorkRecord) -> bool {
        let Ok(key) = cache_key(record) else {
            return false;
        };
        self.lock_store()
            .is_some_and(|store| store.entries.contains_key(&key))
    }

    pub fn len(&self) -> usize {
        self.lock_store().map_or(0, |store| store.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        if let Some(mut store) = self.lock_store() {
            store.entries.clear();
            store.current_bytes = 0;
            self.publish_size(&store);
        }
        self.timings.clear();
    }

    /// Sweep TTL-expired entries. Returns how many were removed.
    pub fn optimize(&self) -> usize {
        let Some(mut store) = self.lock_store() else {
            return 0;
        };
        let now = Instant::now();
        let ttl = self.config.ttl;
        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.remove(key);
        }
        self.publish_size(&store);
        if !expired.is_empty() {
            debug!(removed = expired.len(), "swept expired cache entries");
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, current_bytes) = self
            .lock_store()
            .map_or((0, 0), |store| (store.entries.len(), store.current_bytes));
        CacheStats::compute(
            &self.counters,
            entries,
            self.config.max_entries,
            current_bytes,
            self.config.max_size_bytes,
            self.timings.average_ms(),
        )
    }

    pub fn performance_score(&self) -> f64 {
        self.stats().performance_score
    }

    /// Trim the timing store, publish gauges, and warn on a poor hit ratio
    /// once enough requests have been seen.
    pub fn refresh_stats(&self) -> CacheStats {
        self.timings.trim();
        let stats = self.stats();
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(stats.entries as f64);
        metrics::gauge!(telemetry::CACHE_BYTES).set(stats.current_bytes as f64);
        if stats.total_requests >= self.config.min_requests_for_warning
            && stats.hit_ratio < self.config.hit_ratio_threshold
        {
            warn!(
                hit_ratio = stats.hit_ratio,
                threshold = self.config.hit_ratio_threshold,
                total_requests = stats.total_requests,
                "cache hit ratio below threshold"
            );
        }
        stats
    }

    /// Start the periodic sweep and stats refresh.
    ///
    /// The tasks hold only a weak reference, so dropping the last `Arc`
    /// ends them too. Calling this while maintenance runs is a no-op.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn spawn_maintenance(self: &Arc<Self>) {
        let Ok(mut slot) = self.maintenance.lock() else {
            warn!("cache maintenance lock poisoned, not starting");
            return;
        };
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let token = CancellationToken::new();
        spawn_periodic(
            Arc::downgrade(self),
            token.clone(),
            self.config.maintenance_interval,
            |cache| {
                cache.optimize();
            },
        );
        spawn_periodic(
            Arc::downgrade(self),
            token.clone(),
            self.config.stats_interval,
            |cache| {
                cache.refresh_stats();
            },
        );
        *slot = Some(token);
    }

    /// Stop background maintenance. Idempotent.
    pub fn stop_maintenance(&self) {
        if let Ok(mut slot) = self.maintenance.lock()
            && let Some(token) = slot.take()
        {
            token.cancel();
        }
    }

    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance
            .lock()
            .is_ok_and(|slot| slot.as_ref().is_some_and(|token| !token.is_cancelled()))
    }

    fn record_miss(&self) {
        self.counters.record_miss();
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
    }

    fn lock_store(&self) -> Option<MutexGuard<'_, Store>> {
        match self.store.lock() {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "cache store lock poisoned");
                None
            }
        }
    }

    fn publish_size(&self, store: &Store) {
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(store.entries.len() as f64);
        metrics::gauge!(telemetry::CACHE_BYTES).set(store.current_bytes as f64);
    }
}

impl Drop for ResultCache {
    fn drop(&mut self) {
        self.stop_maintenance();
    }
}

fn spawn_periodic(
    cache: Weak<ResultCache>,
    token: CancellationToken,
    period: Duration,
    tick: fn(&ResultCache),
) {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let Some(cache) = cache.upgrade() else { break };
                    tick(&cache);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(inserted_at: Instant, last_access_at: Instant, access_count: u64) -> CacheEntry {
        CacheEntry {
            result: EmbeddingResult {
                id: "x".into(),
                vector: vec![0.0],
                input_text: String::new(),
                processing_time_ms: 0.0,
                model_used: "m".into(),
                confidence: None,
            },
            fingerprint: String::new(),
            inserted_at,
            access_count,
            last_access_at,
            size_bytes: 1,
        }
    }

    #[test]
    fn score_components() {
        let now = Instant::now();
        let ttl = Duration::from_secs(100);
        let e = entry(now - Duration::from_secs(50), now - Duration::from_secs(10), 4);
        let score = e.eviction_score(now, ttl);
        assert!((score.recency - 0.1).abs() < 1e-9);
        assert!((score.frequency - 0.25).abs() < 1e-9);
        assert!((score.age - 0.5).abs() < 1e-9);
        assert!((score.total - 0.85).abs() < 1e-9);
    }

    #[test]
    fn unused_entry_scores_frequency_one() {
        let now = Instant::now();
        let score = entry(now, now, 0).eviction_score(now, Duration::from_secs(1));
        assert_eq!(score.frequency, 1.0);
        assert_eq!(score.total, 1.0);
    }

    #[test]
    fn valuable_entries_score_lower() {
        let now = Instant::now();
        let ttl = Duration::from_secs(60);
        let hot = entry(now - Duration::from_secs(5), now, 10);
        let cold = entry(now - Duration::from_secs(30), now - Duration::from_secs(30), 0);
        assert!(hot.eviction_score(now, ttl).total < cold.eviction_score(now, ttl).total);
    }

    #[tokio::test]
    async fn fingerprint_mismatch_purges_entry() {
        let cache = ResultCache::new(CacheConfig::new());
        let record = WorkRecord::new("a", "fn a()", "does a");
        cache.set(&record, &entry(Instant::now(), Instant::now(), 0).result);
        let key = cache_key(&record).unwrap();
        if let Some(mut store) = cache.lock_store() {
            if let Some(stored) = store.entries.get_mut(&key) {
                stored.fingerprint = "drifted".into();
            }
        }

        assert!(cache.get(&record).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn fingerprint_mismatch_ignored_without_validation() {
        let cache = ResultCache::new(CacheConfig::new().content_validation(false));
        let record = WorkRecord::new("a", "fn a()", "does a");
        cache.set(&record, &entry(Instant::now(), Instant::now(), 0).result);
        let key = cache_key(&record).unwrap();
        if let Some(mut store) = cache.lock_store() {
            if let Some(stored) = store.entries.get_mut(&key) {
                stored.fingerprint = "drifted".into();
            }
        }

        assert!(cache.get(&record).is_some());
    }

    #[test]
    fn zero_max_entries_is_raised() {
        let cache = ResultCache::new(CacheConfig::new().max_entries(0));
        assert_eq!(cache.config().max_entries, 1);
    }
}
