use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::analytics::{
    OptimizationRecommendation, PerformanceAnalytics, PerformanceSample, PerformanceTrends,
    RecommendationReason,
};
use crate::config::duration_ms;
use crate::resources::ResourceProbe;
use crate::telemetry;
use crate::types::ResourceReading;

/// Samples considered by the failure-rate trigger.
const FAILURE_WINDOW: usize = 5;
/// Failure rate over [`FAILURE_WINDOW`] that forces an optimization.
const FAILURE_RATE_TRIGGER: f64 = 0.2;
/// Samples considered when grouping by batch size.
const ANALYSIS_WINDOW: usize = 20;
/// Samples per side when computing trends.
const TREND_WINDOW: usize = 5;
/// Confidence reported while history is too short.
const LOW_CONFIDENCE: f64 = 0.3;
/// Confidence of the halve-on-failure recommendation.
const STABILITY_CONFIDENCE: f64 = 0.9;
/// `optimize` ignores recommendations below this.
const MIN_CONFIDENCE: f64 = 0.5;

/// How far one adjustment moves the batch size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressiveness {
    /// Half-size steps.
    Conservative,
    /// Shrink 20% on memory, 10% on CPU, grow 20% on headroom.
    #[default]
    Moderate,
    /// One-and-a-half-size steps.
    Aggressive,
}

impl Aggressiveness {
    fn step_multiplier(self) -> f64 {
        match self {
            Self::Conservative => 0.5,
            Self::Moderate => 1.0,
            Self::Aggressive => 1.5,
        }
    }
}

/// Configuration for the batch-size controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub initial_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Process CPU percent above which the size shrinks.
    pub target_cpu_usage: f64,
    /// System memory percent above which the size shrinks.
    pub target_memory_usage: f64,
    /// Samples required before any recommendation is trusted.
    pub min_samples: usize,
    /// Ring buffer length for samples.
    pub history_retention: usize,
    pub aggressiveness: Aggressiveness,
    /// Minimum gap between resource-triggered optimizations.
    #[serde(rename = "optimization_cooldown_ms", with = "duration_ms")]
    pub optimization_cooldown: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 32,
            min_batch_size: 1,
            max_batch_size: 128,
            target_cpu_usage: 80.0,
            target_memory_usage: 75.0,
            min_samples: 5,
            history_retention: 100,
            aggressiveness: Aggressiveness::Moderate,
            optimization_cooldown: Duration::from_secs(10),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_batch_size(mut self, n: usize) -> Self {
        self.initial_batch_size = n;
        self
    }

    pub fn bounds(mut self, min: usize, max: usize) -> Self {
        self.min_batch_size = min;
        self.max_batch_size = max;
        self
    }

    pub fn targets(mut self, cpu: f64, memory: f64) -> Self {
        self.target_cpu_usage = cpu;
        self.target_memory_usage = memory;
        self
    }

    pub fn min_samples(mut self, n: usize) -> Self {
        self.min_samples = n;
        self
    }

    pub fn history_retention(mut self, n: usize) -> Self {
        self.history_retention = n;
        self
    }

    pub fn aggressiveness(mut self, level: Aggressiveness) -> Self {
        self.aggressiveness = level;
        self
    }

    pub fn optimization_cooldown(mut self, cooldown: Duration) -> Self {
        self.optimization_cooldown = cooldown;
        self
    }
}

struct ControllerState {
    current_batch_size: usize,
    history: VecDeque<PerformanceSample>,
    last_optimized_at: Option<Instant>,
}

/// Per-size aggregate over the analysis window.
struct SizeGroup {
    successes: usize,
    attempts: usize,
    throughput_sum: f64,
    memory_sum: f64,
    cpu_sum: f64,
}

impl SizeGroup {
    fn avg_throughput(&self) -> f64 {
        self.throughput_sum / self.successes.max(1) as f64
    }

    fn score(&self, max_throughput: f64) -> f64 {
        let n = self.successes.max(1) as f64;
        let normalized = if max_throughput > 0.0 {
            self.avg_throughput() / max_throughput
        } else {
            0.0
        };
        let resource = (2.0 - (self.memory_sum / n + self.cpu_sum / n) / 100.0).max(0.0);
        let success_rate = self.successes as f64 / self.attempts.max(1) as f64;
        (normalized + resource + success_rate) / 3.0
    }
}

/// Learns a batch size from recorded performance.
///
/// Shared between the orchestrator and the per-batch processors it hands
/// to the strategy selector, so all state sits behind one mutex.
pub struct BatchSizeController {
    config: BatchConfig,
    probe: Arc<dyn ResourceProbe>,
    state: Mutex<ControllerState>,
}

impl BatchSizeController {
    /// Create a controller.
    ///
    /// Inverted bounds are swapped rather than rejected, and every bound is
    /// at least 1, so recommendations always stay inside the interval.
    pub fn new(mut config: BatchConfig, probe: Arc<dyn ResourceProbe>) -> Self {
        config.min_batch_size = config.min_batch_size.max(1);
        config.max_batch_size = config.max_batch_size.max(1);
        if config.min_batch_size > config.max_batch_size {
            warn!(
                min = config.min_batch_size,
                max = config.max_batch_size,
                "batch size bounds inverted, swapping"
            );
            std::mem::swap(&mut config.min_batch_size, &mut config.max_batch_size);
        }
        config.min_samples = config.min_samples.max(1);
        config.history_retention = config.history_retention.max(FAILURE_WINDOW);

        let current_batch_size = config
            .initial_batch_size
            .clamp(config.min_batch_size, config.max_batch_size);
        metrics::gauge!(telemetry::BATCH_SIZE).set(current_batch_size as f64);

        Self {
            state: Mutex::new(ControllerState {
                current_batch_size,
                history: VecDeque::with_capacity(config.history_retention),
                last_optimized_at: None,
            }),
            config,
            probe,
        }
    }

    /// Effective (normalised) configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn current_batch_size(&self) -> usize {
        self.state().current_batch_size
    }

    /// Record one batch execution and optimize if warranted.
    ///
    /// Returns `true` when the batch size was re-evaluated and adopted.
    pub fn record_performance(
        &self,
        batch_size: usize,
        duration: Duration,
        item_count: usize,
        success: bool,
    ) -> bool {
        let reading = self.probe.read();
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let sample = PerformanceSample {
            batch_size,
            duration_ms,
            throughput: item_count as f64 / duration_ms.max(1e-3),
            memory_usage_pct: reading.memory_percent(),
            cpu_usage_pct: reading.cpu_percent,
            success,
            timestamp: SystemTime::now(),
        };
        debug!(
            batch_size,
            duration_ms,
            item_count,
            success,
            throughput = sample.throughput,
            "recorded batch performance"
        );

        let mut state = self.state();
        state.history.push_back(sample);
        while state.history.len() > self.config.history_retention {
            state.history.pop_front();
        }

        if self.should_optimize_with(&state, &reading) {
            self.optimize_locked(&mut state)
        } else {
            false
        }
    }

    /// Whether conditions call for a re-evaluation right now.
    pub fn should_optimize(&self) -> bool {
        let reading = self.probe.read();
        let state = self.state();
        self.should_optimize_with(&state, &reading)
    }

    fn should_optimize_with(&self, state: &ControllerState, reading: &ResourceReading) -> bool {
        if state.history.len() < self.config.min_samples {
            return false;
        }
        if recent_failure_rate(&state.history) > FAILURE_RATE_TRIGGER {
            return true;
        }
        if let Some(last) = state.last_optimized_at
            && last.elapsed() < self.config.optimization_cooldown
        {
            return false;
        }
        reading.cpu_percent > self.config.target_cpu_usage
            || reading.memory_percent() > self.config.target_memory_usage
    }

    pub fn get_optimization_recommendation(&self) -> OptimizationRecommendation {
        let state = self.state();
        self.recommend(&state)
    }

    fn recommend(&self, state: &ControllerState) -> OptimizationRecommendation {
        let current = state.current_batch_size;
        if state.history.len() < self.config.min_samples {
            return OptimizationRecommendation {
                recommended_batch_size: current,
                confidence: LOW_CONFIDENCE,
                reason: RecommendationReason::InsufficientData,
                expected_improvement: 0.0,
            };
        }

        let skip = state.history.len().saturating_sub(ANALYSIS_WINDOW);
        let window: Vec<&PerformanceSample> = state.history.iter().skip(skip).collect();

        if window.iter().all(|s| !s.success) {
            return OptimizationRecommendation {
                recommended_batch_size: self.clamp(current / 2),
                confidence: STABILITY_CONFIDENCE,
                reason: RecommendationReason::Stability,
                expected_improvement: 0.0,
            };
        }

        let mut groups: BTreeMap<usize, SizeGroup> = BTreeMap::new();
        for sample in &window {
            let group = groups.entry(sample.batch_size).or_insert(SizeGroup {
                successes: 0,
                attempts: 0,
                throughput_sum: 0.0,
                memory_sum: 0.0,
                cpu_sum: 0.0,
            });
            group.attempts += 1;
            if sample.success {
                group.successes += 1;
                group.throughput_sum += sample.throughput;
                group.memory_sum += sample.memory_usage_pct;
                group.cpu_sum += sample.cpu_usage_pct;
            }
        }
        groups.retain(|_, group| group.successes > 0);

        let max_throughput = groups
            .values()
            .map(SizeGroup::avg_throughput)
            .fold(0.0, f64::max);
        // Non-empty: at least one window sample succeeded.
        let Some((&candidate, best)) = groups.iter().max_by(|(_, a), (_, b)| {
            a.score(max_throughput).total_cmp(&b.score(max_throughput))
        }) else {
            return OptimizationRecommendation {
                recommended_batch_size: current,
                confidence: LOW_CONFIDENCE,
                reason: RecommendationReason::InsufficientData,
                expected_improvement: 0.0,
            };
        };

        let confidence = (0.5
            + (best.successes as f64 / self.config.min_samples as f64) * 0.4)
            .min(0.9);

        let (adjusted, reason) = match state.history.back() {
            Some(latest) => self.adjust_for_resources(candidate, latest),
            None => (candidate, RecommendationReason::BestObserved),
        };

        let expected_improvement = match groups.get(&current) {
            Some(current_group) if current_group.avg_throughput() > 0.0 => {
                (best.avg_throughput() - current_group.avg_throughput())
                    / current_group.avg_throughput()
            }
            _ => 0.0,
        };

        OptimizationRecommendation {
            recommended_batch_size: self.clamp(adjusted),
            confidence,
            reason,
            expected_improvement,
        }
    }

    fn adjust_for_resources(
        &self,
        candidate: usize,
        latest: &PerformanceSample,
    ) -> (usize, RecommendationReason) {
        let step = self.config.aggressiveness.step_multiplier();
        let size = candidate as f64;
        if latest.memory_usage_pct > self.config.target_memory_usage {
            let shrunk = (size * (1.0 - 0.2 * step)).floor();
            (shrunk.max(1.0) as usize, RecommendationReason::MemoryPressure)
        } else if latest.cpu_usage_pct > self.config.target_cpu_usage {
            let shrunk = (size * (1.0 - 0.1 * step)).floor();
            (shrunk.max(1.0) as usize, RecommendationReason::CpuPressure)
        } else if latest.memory_usage_pct < self.config.target_memory_usage / 2.0
            && latest.cpu_usage_pct < self.config.target_cpu_usage / 2.0
        {
            let grown = (size * (1.0 + 0.2 * step)).ceil();
            (grown as usize, RecommendationReason::Headroom)
        } else {
            (candidate, RecommendationReason::BestObserved)
        }
    }

    /// Adopt the current recommendation if it is confident enough.
    ///
    /// Returns whether the recommendation was adopted.
    pub fn optimize(&self) -> bool {
        let mut state = self.state();
        self.optimize_locked(&mut state)
    }

    fn optimize_locked(&self, state: &mut ControllerState) -> bool {
        let recommendation = self.recommend(state);
        if recommendation.confidence < MIN_CONFIDENCE {
            debug!(
                confidence = recommendation.confidence,
                "recommendation below confidence floor, keeping batch size"
            );
            return false;
        }
        let previous = state.current_batch_size;
        state.current_batch_size = recommendation.recommended_batch_size;
        state.last_optimized_at = Some(Instant::now());
        if previous != state.current_batch_size {
            info!(
                from = previous,
                to = state.current_batch_size,
                reason = ?recommendation.reason,
                confidence = recommendation.confidence,
                "batch size adjusted"
            );
        }
        metrics::gauge!(telemetry::BATCH_SIZE).set(state.current_batch_size as f64);
        true
    }

    pub fn get_performance_analytics(&self) -> PerformanceAnalytics {
        let current_usage = self.probe.read();
        let state = self.state();
        let skip = state.history.len().saturating_sub(ANALYSIS_WINDOW);
        PerformanceAnalytics {
            current_batch_size: state.current_batch_size,
            current_usage,
            recent_history: state.history.iter().skip(skip).cloned().collect(),
            trends: trends(&state.history),
            recommendation: self.recommend(&state),
            total_samples: state.history.len(),
        }
    }

    /// Forget all samples and return to the initial size.
    pub fn reset(&self) {
        let mut state = self.state();
        state.history.clear();
        state.last_optimized_at = None;
        state.current_batch_size = self.clamp(self.config.initial_batch_size);
    }

    fn clamp(&self, size: usize) -> usize {
        size.clamp(self.config.min_batch_size, self.config.max_batch_size)
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        // Every mutation leaves the state consistent, so a poisoned lock is
        // still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn recent_failure_rate(history: &VecDeque<PerformanceSample>) -> f64 {
    let recent: Vec<_> = history.iter().rev().take(FAILURE_WINDOW).collect();
    if recent.is_empty() {
        return 0.0;
    }
    recent.iter().filter(|s| !s.success).count() as f64 / recent.len() as f64
}

fn trends(history: &VecDeque<PerformanceSample>) -> PerformanceTrends {
    if history.len() < TREND_WINDOW * 2 {
        return PerformanceTrends::default();
    }
    let samples: Vec<&PerformanceSample> = history.iter().rev().take(TREND_WINDOW * 2).collect();
    let (recent, prior) = samples.split_at(TREND_WINDOW);
    let avg = |set: &[&PerformanceSample], f: fn(&PerformanceSample) -> f64| {
        set.iter().map(|s| f(s)).sum::<f64>() / set.len() as f64
    };
    PerformanceTrends {
        throughput: avg(recent, |s| s.throughput) - avg(prior, |s| s.throughput),
        memory: avg(recent, |s| s.memory_usage_pct) - avg(prior, |s| s.memory_usage_pct),
        cpu: avg(recent, |s| s.cpu_usage_pct) - avg(prior, |s| s.cpu_usage_pct),
    }
}
