//! Embedding engine boundary and decorators.

pub mod retry;
pub mod traits;

pub use retry::{RetryConfig, RetryingEngine};
pub use traits::EmbeddingEngine;
