//! The embedding engine boundary.
//!
//! Huginn does not compute embeddings. It drives an [`EmbeddingEngine`]
//! supplied by the host (local ONNX runtime, remote service, a test mock).
//!
//! # Error contract
//!
//! - `initialize` fails with [`HuginnError::ModelInitialization`]
//! - `generate_embeddings` fails with [`HuginnError::EmbeddingGeneration`]
//! - back pressure should surface as [`HuginnError::EngineUnavailable`] or
//!   [`HuginnError::ResourceExhausted`] so the retry decorator can act on it
//!
//! # Example
//!
//! ```ignore
//! #[async_trait]
//! impl EmbeddingEngine for MyEngine {
//!     fn name(&self) -> &str { "my-engine" }
//!     fn is_ready(&self) -> bool { self.session.is_some() }
//!     async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
//!         self.session()?.run(texts).map_err(|e| HuginnError::EmbeddingGeneration(e.to_string()))
//!     }
//! }
//! ```

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;

use crate::types::{BatchOptions, EmbeddingResult, WorkRecord};
use crate::{HuginnError, Result};

/// External embedding computation engine.
#[async_trait]
pub trait EmbeddingEngine: Send + Sync {
    /// Engine name for logging/metrics.
    fn name(&self) -> &str;

    /// Model identifier stamped on produced results.
    fn model(&self) -> &str {
        self.name()
    }

    /// Load the model at `path`.
    async fn initialize(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Embed raw texts, one vector per text, in order.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed work records.
    ///
    /// Default implementation builds each record's input text, calls
    /// `generate_embeddings` once, and splits the elapsed time evenly
    /// across the produced results.
    async fn batch_process(
        &self,
        records: &[WorkRecord],
        _options: &BatchOptions,
    ) -> Result<Vec<EmbeddingResult>> {
        let texts: Vec<String> = records.iter().map(WorkRecord::input_text).collect();
        let start = Instant::now();
        let vectors = self.generate_embeddings(&texts).await?;
        if vectors.len() != records.len() {
            return Err(HuginnError::EmbeddingGeneration(format!(
                "engine returned {} vectors for {} texts",
                vectors.len(),
                records.len()
            )));
        }
        let per_item_ms = start.elapsed().as_secs_f64() * 1000.0 / records.len().max(1) as f64;
        Ok(records
            .iter()
            .zip(texts)
            .zip(vectors)
            .map(|((record, input_text), vector)| EmbeddingResult {
                id: record.id.clone(),
                vector,
                input_text,
                processing_time_ms: per_item_ms,
                model_used: self.model().to_owned(),
                confidence: None,
            })
            .collect())
    }

    /// Release model resources.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the engine can accept work.
    fn is_ready(&self) -> bool {
        true
    }
}
