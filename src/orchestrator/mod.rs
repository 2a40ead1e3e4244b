//! Orchestration of cache, controller and selector around an engine.
//!
//! ```text
//! records ──► cache lookup ──► hits ───────────────────────────┐
//!                    │                                          ▼
//!                    └─► misses ──► selector batches ──► engine ──► cache write ──► input order
//!                                    (controller-sized groups)
//! ```
//!
//! With the selector disabled, misses go to the engine in fixed-size
//! groups: the controller's current size, the `batch_size` override, or all
//! at once.

mod builder;
mod pipeline;
mod report;

pub use builder::OrchestratorBuilder;
pub use pipeline::Orchestrator;
pub use report::{BatchReport, FailedRecord, PerformanceMetrics};
