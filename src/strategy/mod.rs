//! Memory-aware execution strategies.
//!
//! The [`ResourceStrategySelector`] maps live memory pressure onto one of a
//! set of [`StrategyProfile`]s and runs work through it batch by batch,
//! switching profile whenever the pressure band changes between batches.
//!
//! | usage              | band         | default profile                          |
//! |--------------------|--------------|------------------------------------------|
//! | `>= critical` (90) | emergency    | 4 items, sequential, cleanup every batch |
//! | `>= high` (75)     | conservative | 16 items, streaming, every 2             |
//! | `>= normal` (60)   | balanced     | 32 items, chunked, every 5               |
//! | below              | aggressive   | 64 items, parallel, every 10             |

use std::sync::Arc;

mod executor;
pub mod profile;
pub mod selector;

pub use profile::{
    ExecutionApproach, MemoryConfig, MemoryThresholds, PressureBand, StrategyKind,
    StrategyProfile,
};
pub use selector::{
    BatchFailure, MemoryWarningCallback, ProcessingCallbacks, ProcessingOutcome,
    ProcessingRecommendations, ProcessingStats, ResourceStrategySelector, StrategyChangeCallback,
};

/// Host-provided memory reclamation hint.
///
/// There is no portable way to force reclamation, so the selector only
/// calls whatever the host installs here (for example an allocator purge).
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;
