//! Per-call batch options

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Progress callback: `(completed, total)` records.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Options for a single `batch_process` call.
///
/// `concurrency` and `memory_limit` are hints forwarded to the engine;
/// actual concurrency is governed by the active strategy.
#[derive(Clone, Default)]
pub struct BatchOptions {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub memory_limit: Option<u64>,
    pub progress: Option<ProgressCallback>,
    pub cancellation: Option<CancellationToken>,
    /// Upper bound for each individual engine call.
    pub timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size.max(1));
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Some(n);
        self
    }

    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn report_progress(&self, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(completed, total);
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("memory_limit", &self.memory_limit)
            .field("progress", &self.progress.is_some())
            .field("cancellation", &self.cancellation)
            .field("timeout", &self.timeout)
            .finish()
    }
}
