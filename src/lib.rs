//! Huginn - adaptive performance layer for batch embedding engines
//!
//! This crate sits in front of an [`EmbeddingEngine`] and keeps it busy
//! without exhausting memory. Four pieces cooperate:
//!
//! - [`ResultCache`] avoids recomputing embeddings for unchanged records,
//! - [`BatchSizeController`] learns a batch size from recorded performance,
//! - [`ResourceStrategySelector`] picks an execution approach from memory
//!   pressure, batch by batch,
//! - [`Orchestrator`] composes them and merges results in input order.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use huginn::{
//!     BatchConfig, BatchOptions, CacheConfig, EmbeddingEngine, MemoryConfig, Orchestrator,
//!     WorkRecord,
//! };
//!
//! struct LengthEngine;
//!
//! #[async_trait]
//! impl EmbeddingEngine for LengthEngine {
//!     fn name(&self) -> &str { "length" }
//!     async fn generate_embeddings(&self, texts: &[String]) -> huginn::Result<Vec<Vec<f32>>> {
//!         Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let orchestrator = Orchestrator::builder(Arc::new(LengthEngine))
//!         .cache(CacheConfig::default())
//!         .batch_controller(BatchConfig::default())
//!         .memory_strategy(MemoryConfig::default())
//!         .build()?;
//!
//!     let records = vec![WorkRecord::new("parse", "fn parse(input: &str)", "Parses input")];
//!     let report = orchestrator.batch_process(&records, &BatchOptions::new()).await?;
//!     println!("{} results, {} from cache", report.results.len(), report.cache_hits);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod resources;
pub mod strategy;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use batch::{
    Aggressiveness, BatchConfig, BatchSizeController, OptimizationRecommendation,
    PerformanceAnalytics, PerformanceSample, RecommendationReason,
};
pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use config::{Config, FeatureToggles};
pub use engine::{EmbeddingEngine, RetryConfig, RetryingEngine};
pub use error::{HuginnError, Result};
pub use orchestrator::{BatchReport, FailedRecord, Orchestrator, OrchestratorBuilder, PerformanceMetrics};
pub use resources::{ResourceProbe, StaticProbe, SysinfoProbe};
pub use strategy::{
    ExecutionApproach, MemoryConfig, MemoryThresholds, ProcessingCallbacks, ProcessingOutcome,
    ReclaimHook, ResourceStrategySelector, StrategyKind, StrategyProfile,
};
pub use types::{BatchOptions, EmbeddingResult, ResourceSnapshot, WorkRecord};
pub use version::{PKG_VERSION, version_string};
