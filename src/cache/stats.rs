//! Cache counters and derived statistics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Number of access timings kept per key.
pub(crate) const ACCESS_WINDOW: usize = 10;

/// Lock-free counters, relaxed ordering (statistics only).
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

/// Bounded store of per-key lookup timings.
///
/// Backed by moka so windows for keys that stop being looked up age out
/// without a separate sweep.
pub(crate) struct AccessTimings {
    windows: moka::sync::Cache<String, VecDeque<f64>>,
}

impl AccessTimings {
    pub fn new(max_keys: u64, idle: Duration) -> Self {
        Self {
            windows: moka::sync::Cache::builder()
                .max_capacity(max_keys)
                .time_to_idle(idle)
                .build(),
        }
    }

    pub fn record(&self, key: &str, elapsed: Duration) {
        let mut window = self.windows.get(key).unwrap_or_default();
        window.push_back(elapsed.as_secs_f64() * 1000.0);
        while window.len() > ACCESS_WINDOW {
            window.pop_front();
        }
        self.windows.insert(key.to_owned(), window);
    }

    /// Mean of per-key means, 0 with no data.
    pub fn average_ms(&self) -> f64 {
        let (sum, keys) = self
            .windows
            .iter()
            .filter(|(_, window)| !window.is_empty())
            .fold((0.0, 0usize), |(sum, keys), (_, window)| {
                let mean = window.iter().sum::<f64>() / window.len() as f64;
                (sum + mean, keys + 1)
            });
        if keys == 0 { 0.0 } else { sum / keys as f64 }
    }

    /// Apply pending moka evictions (bounded trim).
    pub fn trim(&self) {
        self.windows.run_pending_tasks();
    }

    pub fn clear(&self) {
        self.windows.invalidate_all();
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_ratio: f64,
    pub entries: usize,
    pub max_entries: usize,
    pub utilization: f64,
    pub current_bytes: usize,
    pub max_bytes: usize,
    /// `max(0, 1 - current_bytes / max_bytes)`
    pub memory_efficiency: f64,
    pub avg_access_time_ms: f64,
    pub evictions: u64,
    pub invalidations: u64,
    /// `(hit_ratio + memory_efficiency) / 2`
    pub performance_score: f64,
}

impl CacheStats {
    pub(crate) fn compute(
        counters: &CacheCounters,
        entries: usize,
        max_entries: usize,
        current_bytes: usize,
        max_bytes: usize,
        avg_access_time_ms: f64,
    ) -> Self {
        let hits = counters.hits();
        let misses = counters.misses();
        let total_requests = hits + misses;
        let hit_ratio = ratio(hits as f64, total_requests as f64);
        let memory_efficiency = (1.0 - ratio(current_bytes as f64, max_bytes as f64)).max(0.0);
        Self {
            hits,
            misses,
            total_requests,
            hit_ratio,
            entries,
            max_entries,
            utilization: ratio(entries as f64, max_entries as f64),
            current_bytes,
            max_bytes,
            memory_efficiency,
            avg_access_time_ms,
            evictions: counters.evictions(),
            invalidations: counters.invalidations(),
            performance_score: (hit_ratio + memory_efficiency) / 2.0,
        }
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}
