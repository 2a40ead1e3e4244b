//! Tests for the adaptive batch-size controller.

use std::sync::Arc;
use std::time::Duration;

use huginn::{
    Aggressiveness, BatchConfig, BatchSizeController, RecommendationReason, StaticProbe,
};

fn controller_with(config: BatchConfig, memory: f64, cpu: f64) -> (BatchSizeController, Arc<StaticProbe>) {
    let probe = Arc::new(StaticProbe::new(memory, cpu));
    (BatchSizeController::new(config, probe.clone()), probe)
}

fn calm(config: BatchConfig) -> BatchSizeController {
    controller_with(config, 50.0, 50.0).0
}

fn record_n(controller: &BatchSizeController, n: usize, batch_size: usize, success: bool) {
    for _ in 0..n {
        controller.record_performance(batch_size, Duration::from_millis(100), batch_size, success);
    }
}

// ============================================================================
// Recommendations
// ============================================================================

#[test]
fn too_few_samples_keeps_current_size() {
    let controller = calm(BatchConfig::new());
    record_n(&controller, 4, 64, true);

    let rec = controller.get_optimization_recommendation();
    assert_eq!(rec.recommended_batch_size, 32);
    assert_eq!(rec.confidence, 0.3);
    assert_eq!(rec.reason, RecommendationReason::InsufficientData);
}

#[test]
fn rising_throughput_at_64_recommends_64() {
    let controller = calm(BatchConfig::new().initial_batch_size(32).bounds(1, 128));
    for i in 0..10u64 {
        controller.record_performance(64, Duration::from_millis(100 - i * 5), 64, true);
        if i + 1 >= 5 {
            let rec = controller.get_optimization_recommendation();
            assert_eq!(rec.recommended_batch_size, 64);
            assert!(rec.confidence > 0.5, "confidence {}", rec.confidence);
        }
    }
    assert!(controller.optimize());
    assert_eq!(controller.current_batch_size(), 64);
}

#[test]
fn higher_throughput_group_wins_with_expected_improvement() {
    let controller = calm(BatchConfig::new());
    record_n(&controller, 5, 32, true);
    record_n(&controller, 5, 64, true);

    let rec = controller.get_optimization_recommendation();
    assert_eq!(rec.recommended_batch_size, 64);
    assert_eq!(rec.reason, RecommendationReason::BestObserved);
    assert!((rec.expected_improvement - 1.0).abs() < 1e-9);
}

#[test]
fn all_failures_halve_the_size() {
    let controller = calm(BatchConfig::new());
    record_n(&controller, 5, 32, false);
    // The fifth failure triggers an optimization on its own.
    assert_eq!(controller.current_batch_size(), 16);

    let rec = controller.get_optimization_recommendation();
    assert_eq!(rec.reason, RecommendationReason::Stability);
    assert_eq!(rec.confidence, 0.9);
    assert_eq!(rec.recommended_batch_size, 8);
}

#[test]
fn memory_pressure_shrinks_twenty_percent() {
    let (controller, _) = controller_with(BatchConfig::new(), 90.0, 10.0);
    record_n(&controller, 5, 64, true);

    let rec = controller.get_optimization_recommendation();
    assert_eq!(rec.reason, RecommendationReason::MemoryPressure);
    assert_eq!(rec.recommended_batch_size, 51);
    // High memory also triggers the optimization during recording.
    assert_eq!(controller.current_batch_size(), 51);
}

#[test]
fn cpu_pressure_shrinks_ten_percent() {
    let (controller, _) = controller_with(BatchConfig::new(), 50.0, 95.0);
    record_n(&controller, 5, 64, true);

    let rec = controller.get_optimization_recommendation();
    assert_eq!(rec.reason, RecommendationReason::CpuPressure);
    assert_eq!(rec.recommended_batch_size, 57);
}

#[test]
fn headroom_growth_scales_with_aggressiveness() {
    for (level, expected) in [
        (Aggressiveness::Conservative, 71),
        (Aggressiveness::Moderate, 77),
        (Aggressiveness::Aggressive, 84),
    ] {
        let (controller, _) =
            controller_with(BatchConfig::new().aggressiveness(level), 10.0, 10.0);
        record_n(&controller, 5, 64, true);
        let rec = controller.get_optimization_recommendation();
        assert_eq!(rec.reason, RecommendationReason::Headroom);
        assert_eq!(rec.recommended_batch_size, expected, "{level:?}");
    }
}

#[test]
fn recommendation_always_within_bounds() {
    let (controller, probe) = controller_with(BatchConfig::new().bounds(8, 48), 10.0, 10.0);
    let sizes = [1, 4, 400, 48, 8, 1000, 2, 47, 9, 600, 3, 5];
    for (i, &size) in sizes.iter().enumerate() {
        probe.set_memory_percent(if i % 3 == 0 { 95.0 } else { 5.0 });
        controller.record_performance(size, Duration::from_millis(1 + i as u64), size, i % 4 != 0);
        let rec = controller.get_optimization_recommendation();
        assert!((8..=48).contains(&rec.recommended_batch_size), "{rec:?}");
        assert!((8..=48).contains(&controller.current_batch_size()));
    }
}

#[test]
fn inverted_bounds_still_clamp() {
    let controller = calm(BatchConfig::new().initial_batch_size(500).bounds(64, 16));
    assert_eq!(controller.current_batch_size(), 64);
    record_n(&controller, 5, 1, false);
    let rec = controller.get_optimization_recommendation();
    assert!((16..=64).contains(&rec.recommended_batch_size));
}

#[test]
fn zero_duration_is_guarded() {
    let controller = calm(BatchConfig::new());
    controller.record_performance(8, Duration::ZERO, 8, true);
    let sample = &controller.get_performance_analytics().recent_history[0];
    assert!(sample.throughput.is_finite());
}

// ============================================================================
// Optimization triggers
// ============================================================================

#[test]
fn should_optimize_needs_min_samples() {
    let (controller, _) = controller_with(BatchConfig::new(), 99.0, 99.0);
    record_n(&controller, 4, 32, true);
    assert!(!controller.should_optimize());
}

#[test]
fn failure_rate_above_twenty_percent_triggers_optimization() {
    let controller = calm(BatchConfig::new());
    record_n(&controller, 5, 32, true);
    assert!(!controller.should_optimize());
    assert!(controller.optimize());

    // Two failures in the last five samples: 40%, cooldown notwithstanding.
    record_n(&controller, 2, 32, false);
    assert!(controller.should_optimize());
}

#[tokio::test(start_paused = true)]
async fn resource_trigger_respects_cooldown() {
    let (controller, probe) = controller_with(
        BatchConfig::new().optimization_cooldown(Duration::from_secs(10)),
        50.0,
        50.0,
    );
    record_n(&controller, 5, 32, true);
    assert!(controller.optimize());

    probe.set_memory_percent(95.0);
    assert!(!controller.should_optimize());

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(controller.should_optimize());
}

#[test]
fn low_confidence_is_not_adopted() {
    let controller = calm(BatchConfig::new());
    record_n(&controller, 2, 64, true);
    assert!(!controller.optimize());
    assert_eq!(controller.current_batch_size(), 32);
}

// ============================================================================
// Analytics
// ============================================================================

#[test]
fn analytics_cap_recent_history() {
    let controller = calm(BatchConfig::new());
    record_n(&controller, 25, 32, true);

    let analytics = controller.get_performance_analytics();
    assert_eq!(analytics.total_samples, 25);
    assert_eq!(analytics.recent_history.len(), 20);
    assert_eq!(analytics.current_batch_size, controller.current_batch_size());
}

#[test]
fn history_is_bounded_by_retention() {
    let controller = calm(BatchConfig::new().history_retention(10));
    record_n(&controller, 30, 32, true);
    assert_eq!(controller.get_performance_analytics().total_samples, 10);
}

#[test]
fn trends_compare_recent_to_prior() {
    let controller = calm(BatchConfig::new());
    for i in 0..10u64 {
        // Throughput doubles for the recent five.
        let ms = if i < 5 { 200 } else { 100 };
        controller.record_performance(32, Duration::from_millis(ms), 32, true);
    }
    let trends = controller.get_performance_analytics().trends;
    assert!((trends.throughput - (0.32 - 0.16)).abs() < 1e-9);
    assert_eq!(trends.memory, 0.0);
}

#[test]
fn reset_restores_initial_state() {
    let (controller, _) = controller_with(BatchConfig::new(), 90.0, 10.0);
    record_n(&controller, 5, 64, true);
    assert_ne!(controller.current_batch_size(), 32);

    controller.reset();
    assert_eq!(controller.current_batch_size(), 32);
    assert_eq!(controller.get_performance_analytics().total_samples, 0);
}
