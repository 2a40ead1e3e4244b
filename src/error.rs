//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Engine errors
    #[error("model initialization failed: {0}")]
    ModelInitialization(String),

    #[error("embedding generation failed: {0}")]
    EmbeddingGeneration(String),

    /// Engine is temporarily unable to serve (overloaded, restarting).
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engine is not ready")]
    EngineNotReady,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    // Configuration errors
    /// The strategy selector was constructed without any profile.
    #[error("at least one strategy profile is required")]
    NoStrategies,

    #[error("configuration error: {0}")]
    Configuration(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),
}

impl HuginnError {
    /// Whether a retry of the same call may succeed.
    ///
    /// Engine-side back pressure and timeouts are transient; everything else
    /// (bad input, bad configuration) is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HuginnError::EngineUnavailable(_)
                | HuginnError::ResourceExhausted(_)
                | HuginnError::Timeout(_)
        )
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
