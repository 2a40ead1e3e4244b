//! Samples, recommendations and analytics reported by the controller.

use std::time::SystemTime;

use serde::Serialize;

use crate::types::ResourceReading;

/// One recorded batch execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub batch_size: usize,
    pub duration_ms: f64,
    /// Items per millisecond.
    pub throughput: f64,
    pub memory_usage_pct: f64,
    pub cpu_usage_pct: f64,
    pub success: bool,
    pub timestamp: SystemTime,
}

/// Why the controller recommends a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    /// Fewer than `min_samples` samples; keep the current size.
    InsufficientData,
    /// Every recent sample failed; halve the size.
    Stability,
    /// Best observed size, shrunk because memory is above target.
    MemoryPressure,
    /// Best observed size, shrunk because CPU is above target.
    CpuPressure,
    /// Best observed size, grown because both resources are well under target.
    Headroom,
    /// Best observed size, unchanged.
    BestObserved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationRecommendation {
    pub recommended_batch_size: usize,
    /// 0..=1; `optimize` acts only at 0.5 or above.
    pub confidence: f64,
    pub reason: RecommendationReason,
    /// Relative throughput gain of the candidate size over the current one.
    pub expected_improvement: f64,
}

/// Recent-five minus prior-five averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceTrends {
    pub throughput: f64,
    pub memory: f64,
    pub cpu: f64,
}

#[derive(Debug, Clone)]
pub struct PerformanceAnalytics {
    pub current_batch_size: usize,
    pub current_usage: ResourceReading,
    /// Last 20 samples, oldest first.
    pub recent_history: Vec<PerformanceSample>,
    pub trends: PerformanceTrends,
    pub recommendation: OptimizationRecommendation,
    pub total_samples: usize,
}
