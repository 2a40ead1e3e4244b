//! Caching subsystem.
//!
//! [`ResultCache`] keeps computed embeddings keyed on record identity,
//! content and metadata, validated against a content fingerprint (see
//! [`key`]). It is an explicit instance owned by the
//! [`Orchestrator`](crate::Orchestrator), never a process-wide singleton;
//! tests and hosts can hold several side by side.

pub mod key;
pub mod result;
mod stats;

pub use key::{cache_key, content_fingerprint};
pub use result::{CacheConfig, CacheEntry, EvictionScore, ResultCache};
pub use stats::CacheStats;
