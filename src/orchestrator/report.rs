//! Results of a batch run and aggregated performance metrics.

use std::time::Duration;

use serde::Serialize;

use crate::batch::PerformanceAnalytics;
use crate::cache::CacheStats;
use crate::types::{EmbeddingResult, ResourceSnapshot};

/// A record that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecord {
    pub id: String,
    /// Display form of the engine error.
    pub reason: String,
}

/// Outcome of [`Orchestrator::batch_process`](crate::Orchestrator::batch_process).
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Embedded records in input order, cache hits included.
    pub results: Vec<EmbeddingResult>,
    /// Records whose engine call failed, in input order.
    pub failed: Vec<FailedRecord>,
    /// Ids never attempted because the run was cancelled, in input order.
    pub unprocessed: Vec<String>,
    pub cache_hits: usize,
    /// Results produced by the engine during this run.
    pub computed: usize,
    pub total: usize,
    pub cancelled: bool,
    pub duration: Duration,
    pub strategy_changes: usize,
    /// Highest memory percent seen between batches (0 without a selector).
    pub peak_memory_percent: f64,
}

impl BatchReport {
    /// Every input record produced a result.
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.total
    }
}

/// Snapshot of every enabled component.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub cache: Option<CacheStats>,
    pub batch: Option<PerformanceAnalytics>,
    pub memory: Option<ResourceSnapshot>,
    /// Mean of the enabled component scores, 0.5 with none enabled.
    pub overall_score: f64,
}

impl PerformanceMetrics {
    pub(crate) fn new(
        cache: Option<CacheStats>,
        batch: Option<PerformanceAnalytics>,
        memory: Option<ResourceSnapshot>,
    ) -> Self {
        let scores: Vec<f64> = [
            cache.as_ref().map(|stats| stats.performance_score),
            batch.as_ref().map(|analytics| analytics.recommendation.confidence),
            memory
                .as_ref()
                .map(|snapshot| 1.0 - snapshot.usage_percent / 100.0),
        ]
        .into_iter()
        .flatten()
        .collect();
        let overall_score = if scores.is_empty() {
            0.5
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        Self {
            cache,
            batch,
            memory,
            overall_score,
        }
    }
}
