//! The orchestrator and its processing paths.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::builder::OrchestratorBuilder;
use super::report::{BatchReport, FailedRecord, PerformanceMetrics};
use crate::batch::BatchSizeController;
use crate::cache::ResultCache;
use crate::engine::EmbeddingEngine;
use crate::strategy::{ProcessingCallbacks, ResourceStrategySelector};
use crate::telemetry;
use crate::types::{BatchOptions, EmbeddingResult, WorkRecord};
use crate::{HuginnError, Result};

/// Engine output keyed by input position.
type Indexed = Vec<(usize, EmbeddingResult)>;

/// Per-record outcome of one selector batch: a result or the reason its
/// engine call failed.
type Settled = Vec<(usize, std::result::Result<EmbeddingResult, String>)>;

/// What the compute paths produced for the cache misses.
#[derive(Default)]
struct Computed {
    results: Indexed,
    failed: Vec<(usize, String)>,
    unprocessed: Vec<usize>,
    cancelled: bool,
    strategy_changes: usize,
    peak_memory_percent: f64,
}

/// Adaptive front-end to an [`EmbeddingEngine`].
///
/// Owns one instance of each enabled component: the result cache, the
/// batch-size controller and the strategy selector. None of them is
/// global; two orchestrators never share state.
pub struct Orchestrator {
    engine: Arc<dyn EmbeddingEngine>,
    cache: Option<Arc<ResultCache>>,
    controller: Option<Arc<BatchSizeController>>,
    selector: Option<Arc<ResourceStrategySelector>>,
}

impl Orchestrator {
    /// Start configuring an orchestrator around `engine`.
    ///
    /// All components start disabled.
    pub fn builder(engine: Arc<dyn EmbeddingEngine>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(engine)
    }

    pub(crate) fn from_parts(
        engine: Arc<dyn EmbeddingEngine>,
        cache: Option<Arc<ResultCache>>,
        controller: Option<Arc<BatchSizeController>>,
        selector: Option<Arc<ResourceStrategySelector>>,
    ) -> Self {
        Self {
            engine,
            cache,
            controller,
            selector,
        }
    }

    pub fn engine(&self) -> &Arc<dyn EmbeddingEngine> {
        &self.engine
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub fn controller(&self) -> Option<&Arc<BatchSizeController>> {
        self.controller.as_ref()
    }

    pub fn selector(&self) -> Option<&Arc<ResourceStrategySelector>> {
        self.selector.as_ref()
    }

    /// Embed `records`, serving what it can from the cache.
    ///
    /// Results come back in input order. A failing engine call does not
    /// fail the run: its records are listed in [`BatchReport::failed`] and
    /// processing continues.
    ///
    /// # Errors
    ///
    /// [`HuginnError::EngineNotReady`] when there is work for the engine
    /// and it reports not ready.
    #[instrument(skip_all, fields(records = records.len(), engine = self.engine.name()))]
    pub async fn batch_process(
        &self,
        records: &[WorkRecord],
        options: &BatchOptions,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        let total = records.len();
        let mut slots: Vec<Option<EmbeddingResult>> = vec![None; total];
        let mut misses = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match self.cache.as_ref().and_then(|cache| cache.get(record)) {
                Some(hit) => slots[index] = Some(hit),
                None => misses.push(index),
            }
        }
        let cache_hits = total - misses.len();
        debug!(cache_hits, misses = misses.len(), "partitioned records");

        let computed = if misses.is_empty() {
            Computed::default()
        } else {
            if !self.engine.is_ready() {
                return Err(HuginnError::EngineNotReady);
            }
            options.report_progress(cache_hits, total);
            match (&self.controller, &self.selector) {
                (_, Some(selector)) => {
                    self.run_with_selector(selector, records, misses, cache_hits, options)
                        .await
                }
                (Some(controller), None) => {
                    let size = options
                        .batch_size
                        .unwrap_or_else(|| controller.current_batch_size());
                    self.run_in_groups(records, misses, size, cache_hits, options)
                        .await
                }
                (None, None) => {
                    let size = options.batch_size.unwrap_or(misses.len());
                    self.run_in_groups(records, misses, size, cache_hits, options)
                        .await
                }
            }
        };

        if let Some(cache) = &self.cache {
            for (index, result) in &computed.results {
                cache.set(&records[*index], result);
            }
        }

        let computed_count = computed.results.len();
        for (index, result) in computed.results {
            slots[index] = Some(result);
        }
        let mut failed = computed.failed;
        failed.sort_by_key(|(index, _)| *index);
        let mut unprocessed = computed.unprocessed;
        unprocessed.sort_unstable();

        let report = BatchReport {
            results: slots.into_iter().flatten().collect(),
            failed: failed
                .into_iter()
                .map(|(index, reason)| FailedRecord {
                    id: records[index].id.clone(),
                    reason,
                })
                .collect(),
            unprocessed: unprocessed
                .into_iter()
                .map(|index| records[index].id.clone())
                .collect(),
            cache_hits,
            computed: computed_count,
            total,
            cancelled: computed.cancelled,
            duration: started.elapsed(),
            strategy_changes: computed.strategy_changes,
            peak_memory_percent: computed.peak_memory_percent,
        };
        info!(
            total,
            cache_hits,
            computed = report.computed,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration.as_secs_f64() * 1000.0,
            "batch processed"
        );
        Ok(report)
    }

    async fn run_with_selector(
        &self,
        selector: &ResourceStrategySelector,
        records: &[WorkRecord],
        misses: Vec<usize>,
        offset: usize,
        options: &BatchOptions,
    ) -> Computed {
        let mut callbacks = ProcessingCallbacks::new();
        if let Some(progress) = options.progress.clone() {
            let total = records.len();
            callbacks = callbacks.on_progress(move |done, _| progress(offset + done, total));
        }
        let outcome = selector
            .process_with_memory_awareness(
                misses,
                move |items| self.process_group(items, records, options),
                &callbacks,
                options.cancellation.as_ref(),
            )
            .await;

        let mut computed = Computed {
            unprocessed: outcome.unprocessed,
            cancelled: outcome.cancelled,
            strategy_changes: outcome.stats.strategy_changes,
            peak_memory_percent: outcome.stats.peak_memory_percent,
            ..Computed::default()
        };
        for (index, settled) in outcome.results {
            match settled {
                Ok(result) => computed.results.push((index, result)),
                Err(reason) => computed.failed.push((index, reason)),
            }
        }
        for failure in &outcome.failures {
            let reason = failure.error.to_string();
            computed
                .failed
                .extend(failure.items.iter().map(|&index| (index, reason.clone())));
        }
        computed
    }

    /// Processor handed to the selector for one strategy batch.
    ///
    /// Splits the batch into controller-sized groups (or the override). A
    /// failing group settles its own records as failed; the other groups
    /// keep their results.
    async fn process_group(
        &self,
        items: Vec<usize>,
        records: &[WorkRecord],
        options: &BatchOptions,
    ) -> Result<Settled> {
        let size = options
            .batch_size
            .or_else(|| self.controller.as_ref().map(|c| c.current_batch_size()))
            .unwrap_or(items.len())
            .max(1);
        let mut settled = Vec::with_capacity(items.len());
        for group in items.chunks(size) {
            match self.call_engine(group, records, options).await {
                Ok(results) => settled.extend(results.into_iter().map(|(i, r)| (i, Ok(r)))),
                Err(error) => {
                    warn!(group = group.len(), error = %error, "engine call failed, continuing");
                    let reason = error.to_string();
                    settled.extend(group.iter().map(|&index| (index, Err(reason.clone()))));
                }
            }
        }
        Ok(settled)
    }

    /// Controller-only and direct paths: fixed-size groups, failures
    /// recorded per group.
    async fn run_in_groups(
        &self,
        records: &[WorkRecord],
        misses: Vec<usize>,
        size: usize,
        offset: usize,
        options: &BatchOptions,
    ) -> Computed {
        let size = size.max(1);
        let mut computed = Computed::default();
        let mut done = 0;
        for (position, group) in misses.chunks(size).enumerate() {
            if options.is_cancelled() {
                computed.cancelled = true;
                computed.unprocessed = misses[position * size..].to_vec();
                info!(unprocessed = computed.unprocessed.len(), "processing cancelled");
                break;
            }
            match self.call_engine(group, records, options).await {
                Ok(results) => computed.results.extend(results),
                Err(error) => {
                    warn!(group = group.len(), error = %error, "engine call failed, continuing");
                    let reason = error.to_string();
                    computed
                        .failed
                        .extend(group.iter().map(|&index| (index, reason.clone())));
                }
            }
            done += group.len();
            options.report_progress(offset + done, records.len());
        }
        computed
    }

    /// One engine call: timed, bounded by the optional timeout, checked
    /// for a matching result count and reported to the controller.
    async fn call_engine(
        &self,
        group: &[usize],
        records: &[WorkRecord],
        options: &BatchOptions,
    ) -> Result<Indexed> {
        let batch: Vec<WorkRecord> = group.iter().map(|&index| records[index].clone()).collect();
        let started = Instant::now();
        let call = self.engine.batch_process(&batch, options);
        let outcome = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(HuginnError::Timeout(limit))),
            None => call.await,
        };
        let elapsed = started.elapsed();
        metrics::histogram!(telemetry::ENGINE_CALL_DURATION_SECONDS, "engine" => self.engine.name().to_owned())
            .record(elapsed.as_secs_f64());

        let outcome = outcome.and_then(|results| {
            if results.len() == batch.len() {
                Ok(results)
            } else {
                Err(HuginnError::EmbeddingGeneration(format!(
                    "engine returned {} results for {} records",
                    results.len(),
                    batch.len()
                )))
            }
        });
        if outcome.is_err() {
            metrics::counter!(telemetry::ENGINE_FAILURES_TOTAL, "engine" => self.engine.name().to_owned())
                .increment(1);
        }
        if let Some(controller) = &self.controller {
            controller.record_performance(batch.len(), elapsed, batch.len(), outcome.is_ok());
        }
        debug!(
            items = batch.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            success = outcome.is_ok(),
            "engine call"
        );
        outcome.map(|results| group.iter().copied().zip(results).collect())
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::new(
            self.cache.as_ref().map(|cache| cache.stats()),
            self.controller
                .as_ref()
                .map(|controller| controller.get_performance_analytics()),
            self.selector
                .as_ref()
                .map(|selector| selector.current_memory_usage()),
        )
    }

    /// Sweep expired cache entries and let the controller re-evaluate.
    pub fn optimize_performance(&self) {
        let expired = self.cache.as_ref().map_or(0, |cache| cache.optimize());
        let adopted = self
            .controller
            .as_ref()
            .is_some_and(|controller| controller.optimize());
        info!(expired, adopted, "performance optimization pass");
    }

    /// Spawn cache maintenance and the memory monitor.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn start(&self) {
        if let Some(cache) = &self.cache {
            cache.spawn_maintenance();
        }
        if let Some(selector) = &self.selector {
            selector.spawn_monitor();
        }
    }

    /// Stop background tasks and clear the cache. Idempotent.
    pub fn cleanup(&self) {
        if let Some(selector) = &self.selector {
            selector.stop();
        }
        if let Some(cache) = &self.cache {
            cache.stop_maintenance();
            cache.clear();
        }
    }

    /// [`cleanup`](Self::cleanup), then shut the engine down.
    pub async fn shutdown(&self) -> Result<()> {
        self.cleanup();
        self.engine.shutdown().await
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(selector) = &self.selector {
            selector.stop();
        }
        if let Some(cache) = &self.cache {
            cache.stop_maintenance();
        }
    }
}
