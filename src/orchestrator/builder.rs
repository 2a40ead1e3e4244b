//! Builder for configuring orchestrator instances

use std::sync::Arc;

use tracing::debug;

use super::pipeline::Orchestrator;
use crate::batch::{BatchConfig, BatchSizeController};
use crate::cache::{CacheConfig, ResultCache};
use crate::config::Config;
use crate::engine::{EmbeddingEngine, RetryConfig, RetryingEngine};
use crate::resources::{ResourceProbe, SysinfoProbe};
use crate::strategy::{MemoryConfig, ReclaimHook, ResourceStrategySelector, StrategyProfile};
use crate::Result;

/// Builder for [`Orchestrator`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use huginn::{BatchConfig, CacheConfig, EmbeddingEngine, MemoryConfig, Orchestrator};
/// # fn demo(engine: Arc<dyn EmbeddingEngine>) -> huginn::Result<()> {
/// let orchestrator = Orchestrator::builder(engine)
///     .cache(CacheConfig::new().max_entries(5_000))
///     .batch_controller(BatchConfig::new().bounds(4, 64))
///     .memory_strategy(MemoryConfig::new())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    engine: Arc<dyn EmbeddingEngine>,
    cache: Option<CacheConfig>,
    batch: Option<BatchConfig>,
    memory: Option<MemoryConfig>,
    strategies: Option<Vec<StrategyProfile>>,
    probe: Option<Arc<dyn ResourceProbe>>,
    reclaim_hook: Option<ReclaimHook>,
    retry: Option<RetryConfig>,
}

impl OrchestratorBuilder {
    pub fn new(engine: Arc<dyn EmbeddingEngine>) -> Self {
        Self {
            engine,
            cache: None,
            batch: None,
            memory: None,
            strategies: None,
            probe: None,
            reclaim_hook: None,
            retry: None,
        }
    }

    /// Enable the result cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Enable adaptive batch sizing.
    pub fn batch_controller(mut self, config: BatchConfig) -> Self {
        self.batch = Some(config);
        self
    }

    /// Enable memory-aware strategy selection.
    pub fn memory_strategy(mut self, config: MemoryConfig) -> Self {
        self.memory = Some(config);
        self
    }

    /// Replace the built-in strategy profiles.
    ///
    /// Only used when memory-aware strategy selection is enabled.
    pub fn strategies(mut self, profiles: Vec<StrategyProfile>) -> Self {
        self.strategies = Some(profiles);
        self
    }

    /// Resource probe shared by the controller and the selector.
    ///
    /// Defaults to [`SysinfoProbe`].
    pub fn probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Hook invoked for reclaim hints when `enable_reclaim_hints` is set.
    pub fn reclaim_hook(mut self, hook: ReclaimHook) -> Self {
        self.reclaim_hook = Some(hook);
        self
    }

    /// Wrap the engine in a [`RetryingEngine`].
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Enable the components switched on in `config.features`.
    pub fn from_config(mut self, config: &Config) -> Self {
        self.cache = config.features.cache.then(|| config.cache.clone());
        self.batch = config.features.batch.then(|| config.batch.clone());
        self.memory = config.features.memory.then(|| config.memory.clone());
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Fails when the selector rejects its profiles (none given, or not
    /// monotonic in memory pressure).
    pub fn build(self) -> Result<Orchestrator> {
        let engine: Arc<dyn EmbeddingEngine> = match self.retry {
            Some(retry) => Arc::new(RetryingEngine::new(self.engine, retry)),
            None => self.engine,
        };

        let needs_probe = self.batch.is_some() || self.memory.is_some();
        let probe: Option<Arc<dyn ResourceProbe>> = match self.probe {
            Some(probe) => Some(probe),
            None if needs_probe => Some(Arc::new(SysinfoProbe::new())),
            None => None,
        };

        let cache = self.cache.map(|config| Arc::new(ResultCache::new(config)));

        let controller = match (self.batch, &probe) {
            (Some(config), Some(probe)) => {
                Some(Arc::new(BatchSizeController::new(config, Arc::clone(probe))))
            }
            _ => None,
        };

        let selector = match (self.memory, &probe) {
            (Some(config), Some(probe)) => {
                let profiles = self.strategies.unwrap_or_else(StrategyProfile::defaults);
                let mut selector = ResourceStrategySelector::new(config, profiles, Arc::clone(probe))?;
                if let Some(hook) = self.reclaim_hook {
                    selector = selector.with_reclaim_hook(hook);
                }
                Some(Arc::new(selector))
            }
            _ => None,
        };

        debug!(
            engine = engine.name(),
            cache = cache.is_some(),
            controller = controller.is_some(),
            selector = selector.is_some(),
            "orchestrator built"
        );
        Ok(Orchestrator::from_parts(engine, cache, controller, selector))
    }
}
