//! Core types shared by the cache, controller, selector and orchestrator

pub mod options;
pub mod record;
pub mod resource;

pub use options::{BatchOptions, ProgressCallback};
pub use record::{EmbeddingResult, WorkRecord};
pub use resource::{ProcessMemory, ResourceReading, ResourceSnapshot};
