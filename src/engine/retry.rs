//! Retry configuration, delay calculation, and the engine decorator.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! [`RetryingEngine`], which wraps an [`EmbeddingEngine`] with automatic
//! retry on transient errors.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::EmbeddingEngine;
use crate::telemetry;
use crate::types::{BatchOptions, EmbeddingResult, WorkRecord};
use crate::{HuginnError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial call).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay for a given attempt number (0-indexed), without jitter.
    ///
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Delay including jitter: up to +25% of the base delay, still capped
    /// at `max_delay`.
    pub fn effective_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if !self.jitter {
            return base;
        }
        let fraction = rand::random::<f64>() * 0.25;
        base.mul_f64(1.0 + fraction).min(self.max_delay)
    }
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (see [`HuginnError::is_transient()`]) up to
/// `config.max_attempts`. Permanent errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    engine_name: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "engine" => engine_name.to_owned())
                        .increment(1);
                    let delay = config.effective_delay(attempt);
                    warn!(
                        engine = engine_name,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(HuginnError::EngineNotReady))
}

/// Decorator that wraps an [`EmbeddingEngine`] with retry logic.
///
/// `initialize` and `shutdown` are passed through untouched.
pub struct RetryingEngine {
    inner: Arc<dyn EmbeddingEngine>,
    config: RetryConfig,
}

impl RetryingEngine {
    pub fn new(inner: Arc<dyn EmbeddingEngine>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl EmbeddingEngine for RetryingEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn initialize(&self, path: &Path) -> Result<()> {
        self.inner.initialize(path).await
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        with_retry(&self.config, self.inner.name(), "generate_embeddings", || {
            self.inner.generate_embeddings(texts)
        })
        .await
    }

    async fn batch_process(
        &self,
        records: &[WorkRecord],
        options: &BatchOptions,
    ) -> Result<Vec<EmbeddingResult>> {
        with_retry(&self.config, self.inner.name(), "batch_process", || {
            self.inner.batch_process(records, options)
        })
        .await
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }

    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }
}
