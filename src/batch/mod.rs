//! Adaptive batch sizing.
//!
//! [`BatchSizeController`] records how each batch went (duration, item
//! count, success, resource usage at the time) and learns a batch size that
//! balances throughput against the configured CPU and memory targets.

pub mod analytics;
pub mod controller;

pub use analytics::{
    OptimizationRecommendation, PerformanceAnalytics, PerformanceSample, PerformanceTrends,
    RecommendationReason,
};
pub use controller::{Aggressiveness, BatchConfig, BatchSizeController};
