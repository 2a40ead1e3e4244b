//! Tests for the result cache: lookups, invalidation, eviction and
//! background maintenance.

use std::sync::Arc;
use std::time::Duration;

use huginn::cache::{cache_key, content_fingerprint};
use huginn::{CacheConfig, EmbeddingResult, ResultCache, WorkRecord};

// ============================================================================
// Helpers
// ============================================================================

fn record(id: &str) -> WorkRecord {
    WorkRecord::new(id, format!("fn {id}()"), format!("Does {id}"))
}

fn result_for(record: &WorkRecord) -> EmbeddingResult {
    EmbeddingResult {
        id: record.id.clone(),
        vector: vec![0.25, -0.5, 1.0],
        input_text: record.input_text(),
        processing_time_ms: 1.5,
        model_used: "test-model".to_string(),
        confidence: Some(0.9),
    }
}

fn cache(config: CacheConfig) -> ResultCache {
    ResultCache::new(config)
}

// ============================================================================
// Keys
// ============================================================================

#[test]
fn content_changes_key_and_fingerprint() {
    let a = record("parse");
    let mut b = a.clone();
    b.summary = "Parses differently".into();
    assert_ne!(cache_key(&a).unwrap(), cache_key(&b).unwrap());
    assert_ne!(content_fingerprint(&a), content_fingerprint(&b));
}

#[test]
fn key_depends_on_metadata() {
    let a = record("parse").meta("file", "a.rs");
    let b = record("parse").meta("file", "b.rs");
    assert_ne!(cache_key(&a).unwrap(), cache_key(&b).unwrap());
}

// ============================================================================
// Lookup
// ============================================================================

#[tokio::test]
async fn get_after_set_returns_equal_result() {
    let cache = cache(CacheConfig::new());
    let rec = record("a");
    let stored = result_for(&rec);
    cache.set(&rec, &stored);

    let same_content = record("a");
    assert_eq!(cache.get(&same_content), Some(stored));
}

#[tokio::test]
async fn get_returns_a_copy() {
    let cache = cache(CacheConfig::new());
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));

    let mut copy = cache.get(&rec).unwrap();
    copy.vector.clear();
    assert_eq!(cache.get(&rec).unwrap().vector.len(), 3);
}

#[tokio::test]
async fn content_change_misses() {
    let cache = cache(CacheConfig::new());
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));

    let changed = record("a").snippet("a() + 1");
    assert_eq!(cache.get(&changed), None);
    assert!(cache.contains(&rec));
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn content_change_misses_without_validation() {
    let cache = cache(CacheConfig::new().content_validation(false));
    let rec = WorkRecord::new("a", "fn a()", "old summary");
    cache.set(&rec, &result_for(&rec));

    let edited = WorkRecord::new("a", "fn a(x: u32)", "totally new summary");
    assert_eq!(cache.get(&edited), None);
    assert_eq!(cache.get(&rec).map(|r| r.input_text), Some(rec.input_text()));
}

#[tokio::test]
async fn hit_ratio_is_exact() {
    let cache = cache(CacheConfig::new());
    let cached = record("cached");
    cache.set(&cached, &result_for(&cached));

    // 3 hits, 4 misses
    for _ in 0..3 {
        assert!(cache.get(&cached).is_some());
    }
    for i in 0..4 {
        assert!(cache.get(&record(&format!("missing-{i}"))).is_none());
    }

    let stats = cache.stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.total_requests, 7);
    assert_eq!(stats.hit_ratio, 3.0 / 7.0);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_misses_and_purges() {
    let cache = cache(CacheConfig::new().ttl(Duration::from_secs(60)));
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(cache.get(&rec).is_some());

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(cache.get(&rec).is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.stats().invalidations, 1);
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn one_past_max_entries_evicts_exactly_one() {
    let cache = cache(CacheConfig::new().max_entries(3));
    for id in ["a", "b", "c", "d"] {
        let rec = record(id);
        cache.set(&rec, &result_for(&rec));
    }
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.stats().evictions, 1);
    assert!(cache.contains(&record("d")));
}

#[tokio::test]
async fn scenario_two_entries_then_third() {
    let cache = cache(CacheConfig::new().max_entries(2));
    let (a, b, c) = (record("a"), record("b"), record("c"));
    cache.set(&a, &result_for(&a));
    cache.set(&b, &result_for(&b));
    assert!(cache.get(&a).is_some());
    cache.set(&c, &result_for(&c));

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&c));
    assert!(cache.contains(&a) ^ cache.contains(&b));
}

#[tokio::test(start_paused = true)]
async fn frequently_used_entry_survives() {
    let cache = cache(CacheConfig::new().max_entries(2));
    let (a, b, c) = (record("a"), record("b"), record("c"));
    cache.set(&a, &result_for(&a));
    cache.set(&b, &result_for(&b));
    for _ in 0..3 {
        cache.get(&a);
    }
    cache.set(&c, &result_for(&c));

    assert!(cache.contains(&a));
    assert!(!cache.contains(&b));
}

#[tokio::test(start_paused = true)]
async fn ties_evict_oldest_insertion() {
    let cache = cache(CacheConfig::new().max_entries(2).ttl(Duration::from_secs(3600)));
    let (a, b, c) = (record("a"), record("b"), record("c"));
    cache.set(&a, &result_for(&a));
    cache.set(&b, &result_for(&b));
    // Same instant, same access count: identical scores.
    cache.set(&c, &result_for(&c));
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&c));
}

#[tokio::test]
async fn byte_budget_triggers_eviction() {
    let rec = record("a");
    let one_entry = serde_json::to_vec(&result_for(&rec)).unwrap().len() + 64;
    let cache = cache(CacheConfig::new().max_size_bytes(one_entry + one_entry / 2));

    for id in ["a", "b", "c"] {
        let rec = record(id);
        cache.set(&rec, &result_for(&rec));
    }
    assert_eq!(cache.len(), 1);
    assert!(cache.stats().current_bytes <= one_entry + one_entry / 2);
}

#[tokio::test]
async fn oversized_result_is_not_cached() {
    let cache = cache(CacheConfig::new().max_size_bytes(16));
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn replacing_an_entry_does_not_evict() {
    let cache = cache(CacheConfig::new().max_entries(2));
    let (a, b) = (record("a"), record("b"));
    cache.set(&a, &result_for(&a));
    cache.set(&b, &result_for(&b));
    cache.set(&a, &result_for(&a));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 0);
}

// ============================================================================
// Maintenance
// ============================================================================

#[tokio::test(start_paused = true)]
async fn optimize_sweeps_expired() {
    let cache = cache(CacheConfig::new().ttl(Duration::from_secs(10)));
    let (a, b) = (record("a"), record("b"));
    cache.set(&a, &result_for(&a));
    tokio::time::advance(Duration::from_secs(8)).await;
    cache.set(&b, &result_for(&b));
    tokio::time::advance(Duration::from_secs(3)).await;

    assert_eq!(cache.optimize(), 1);
    assert!(cache.contains(&b));
    assert!(!cache.contains(&a));
}

#[tokio::test(start_paused = true)]
async fn maintenance_task_sweeps_periodically() {
    let cache = Arc::new(cache(
        CacheConfig::new()
            .ttl(Duration::from_secs(10))
            .maintenance_interval(Duration::from_secs(60)),
    ));
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));
    cache.spawn_maintenance();
    assert!(cache.is_maintenance_running());

    tokio::time::advance(Duration::from_secs(61)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!cache.contains(&rec));

    cache.stop_maintenance();
    cache.stop_maintenance();
    assert!(!cache.is_maintenance_running());
}

#[tokio::test]
async fn clear_keeps_counters() {
    let cache = cache(CacheConfig::new());
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));
    cache.get(&rec);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().current_bytes, 0);
}

#[tokio::test]
async fn stats_report_utilization_and_score() {
    let cache = cache(CacheConfig::new().max_entries(4));
    let rec = record("a");
    cache.set(&rec, &result_for(&rec));
    cache.get(&rec);

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.utilization, 0.25);
    assert_eq!(stats.hit_ratio, 1.0);
    assert!(stats.memory_efficiency > 0.99);
    assert_eq!(stats.performance_score, (stats.hit_ratio + stats.memory_efficiency) / 2.0);
    assert_eq!(cache.performance_score(), stats.performance_score);
}
