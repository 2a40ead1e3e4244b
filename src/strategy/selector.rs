use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::ReclaimHook;
use super::executor::{self, BatchRun};
use super::profile::{MemoryConfig, PressureBand, StrategyProfile};
use crate::error::{HuginnError, Result};
use crate::resources::ResourceProbe;
use crate::telemetry;
use crate::types::{ProgressCallback, ResourceSnapshot};

/// Snapshots kept after a cleanup pass trims the history.
const CLEANUP_HISTORY_KEEP: usize = 100;

pub type StrategyChangeCallback = Arc<dyn Fn(&StrategyProfile, &StrategyProfile) + Send + Sync>;
pub type MemoryWarningCallback = Arc<dyn Fn(&ResourceSnapshot) + Send + Sync>;

/// Hooks fired by [`ResourceStrategySelector::process_with_memory_awareness`].
#[derive(Clone, Default)]
pub struct ProcessingCallbacks {
    /// `(previous, next)` on every strategy switch.
    pub on_strategy_change: Option<StrategyChangeCallback>,
    /// After a batch that left usage above the `high` threshold.
    pub on_memory_warning: Option<MemoryWarningCallback>,
    /// `(completed, total)` after every batch.
    pub on_progress: Option<ProgressCallback>,
}

impl ProcessingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_strategy_change(
        mut self,
        callback: impl Fn(&StrategyProfile, &StrategyProfile) + Send + Sync + 'static,
    ) -> Self {
        self.on_strategy_change = Some(Arc::new(callback));
        self
    }

    pub fn on_memory_warning(
        mut self,
        callback: impl Fn(&ResourceSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.on_memory_warning = Some(Arc::new(callback));
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ProcessingCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingCallbacks")
            .field("on_strategy_change", &self.on_strategy_change.is_some())
            .field("on_memory_warning", &self.on_memory_warning.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// A batch whose processor call failed.
#[derive(Debug)]
pub struct BatchFailure<T> {
    pub items: Vec<T>,
    pub error: HuginnError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub batches: usize,
    pub strategy_changes: usize,
    pub cleanups: usize,
    pub peak_memory_percent: f64,
    pub average_memory_percent: f64,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct ProcessingOutcome<T, R> {
    /// Results of successful batches, in item order.
    pub results: Vec<R>,
    pub failures: Vec<BatchFailure<T>>,
    /// Items never attempted because processing was cancelled.
    pub unprocessed: Vec<T>,
    pub cancelled: bool,
    pub stats: ProcessingStats,
}

impl<T, R> ProcessingOutcome<T, R> {
    fn new() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
            unprocessed: Vec::new(),
            cancelled: false,
            stats: ProcessingStats::default(),
        }
    }

    /// Every item of every failed batch.
    pub fn failed_items(&self) -> impl Iterator<Item = &T> {
        self.failures.iter().flat_map(|failure| failure.items.iter())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingRecommendations {
    pub strategy: StrategyProfile,
    pub snapshot: ResourceSnapshot,
    pub guidance: Vec<String>,
    /// Items that fit in `available_for_processing` with the active strategy.
    pub estimated_capacity: u64,
}

struct SelectorState {
    current: StrategyProfile,
    history: VecDeque<ResourceSnapshot>,
}

/// Memory-aware strategy state machine and adaptive batch executor.
///
/// Profiles are kept sorted by `max_batch_size`; each pressure band resolves
/// to a profile of its own kind or, when none exists, to a position in that
/// ordering.
pub struct ResourceStrategySelector {
    config: MemoryConfig,
    profiles: Vec<StrategyProfile>,
    /// Profile index per [`PressureBand`], most constrained first.
    bands: [usize; 4],
    probe: Arc<dyn ResourceProbe>,
    reclaim: Option<ReclaimHook>,
    state: Mutex<SelectorState>,
    monitor: Mutex<Option<CancellationToken>>,
}

impl ResourceStrategySelector {
    /// Build a selector.
    ///
    /// # Errors
    ///
    /// [`HuginnError::NoStrategies`] for an empty profile list, and
    /// [`HuginnError::Configuration`] when a more constrained band would
    /// resolve to a larger batch size than a less constrained one.
    pub fn new(
        mut config: MemoryConfig,
        mut profiles: Vec<StrategyProfile>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Result<Self> {
        if profiles.is_empty() {
            return Err(HuginnError::NoStrategies);
        }
        profiles.sort_by_key(|p| p.max_batch_size);
        let bands = resolve_bands(&profiles);
        for pair in bands.windows(2) {
            let (tight, loose) = (&profiles[pair[0]], &profiles[pair[1]]);
            if tight.max_batch_size > loose.max_batch_size {
                return Err(HuginnError::Configuration(format!(
                    "strategy {} ({} items) is used under higher memory pressure than {} ({} items)",
                    tight.kind, tight.max_batch_size, loose.kind, loose.max_batch_size
                )));
            }
        }
        config.parallelism = config.parallelism.max(1);
        config.history_capacity = config.history_capacity.max(1);

        let current = profiles[bands[PressureBand::Balanced.index()]].clone();
        Ok(Self {
            state: Mutex::new(SelectorState {
                current,
                history: VecDeque::with_capacity(config.history_capacity.min(1024)),
            }),
            config,
            profiles,
            bands,
            probe,
            reclaim: None,
            monitor: Mutex::new(None),
        })
    }

    /// Selector over [`StrategyProfile::defaults`].
    pub fn with_defaults(config: MemoryConfig, probe: Arc<dyn ResourceProbe>) -> Result<Self> {
        Self::new(config, StrategyProfile::defaults(), probe)
    }

    /// Install the hook called for reclaim hints.
    ///
    /// It only runs when `enable_reclaim_hints` is set.
    pub fn with_reclaim_hook(mut self, hook: ReclaimHook) -> Self {
        self.reclaim = Some(hook);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Profiles ordered by `max_batch_size`.
    pub fn profiles(&self) -> &[StrategyProfile] {
        &self.profiles
    }

    pub fn profile_for_band(&self, band: PressureBand) -> &StrategyProfile {
        &self.profiles[self.bands[band.index()]]
    }

    pub fn select_optimal_strategy(&self, snapshot: &ResourceSnapshot) -> StrategyProfile {
        let band = PressureBand::for_usage(snapshot.usage_percent, &self.config.thresholds);
        self.profile_for_band(band).clone()
    }

    pub fn current_strategy(&self) -> StrategyProfile {
        self.state().current.clone()
    }

    /// Take a fresh snapshot from the probe.
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot::from_reading(self.probe.read(), self.config.memory_buffer)
    }

    /// Latest recorded snapshot, or a fresh one when none was recorded.
    pub fn current_memory_usage(&self) -> ResourceSnapshot {
        let latest = self.state().history.back().cloned();
        latest.unwrap_or_else(|| self.snapshot())
    }

    pub fn memory_history(&self) -> Vec<ResourceSnapshot> {
        self.state().history.iter().cloned().collect()
    }

    /// Process `items` in strategy-sized batches.
    ///
    /// Before each batch a snapshot is taken and the strategy re-selected;
    /// a switch changes the size of every following batch. A failed batch
    /// is recorded in [`ProcessingOutcome::failures`] and processing goes
    /// on. Cancellation stops before the next batch or sub-chunk and
    /// returns the rest as [`ProcessingOutcome::unprocessed`].
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn process_with_memory_awareness<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        processor: F,
        callbacks: &ProcessingCallbacks,
        cancel: Option<&CancellationToken>,
    ) -> ProcessingOutcome<T, R>
    where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<Vec<R>>>,
    {
        let started = Instant::now();
        let total = items.len();
        let mut remaining: VecDeque<T> = items.into();
        let mut outcome = ProcessingOutcome::new();
        let mut active = self.current_strategy();
        let mut completed = 0usize;
        let mut memory_sum = 0.0;
        let reclaim = self
            .reclaim
            .as_ref()
            .filter(|_| self.config.enable_reclaim_hints);

        while !remaining.is_empty() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                outcome.cancelled = true;
                break;
            }

            let before = self.snapshot();
            let selected = self.select_optimal_strategy(&before);
            if selected != active {
                info!(
                    from = %active.kind,
                    to = %selected.kind,
                    usage_percent = before.usage_percent,
                    batch_size = selected.max_batch_size,
                    "switching strategy"
                );
                metrics::counter!(telemetry::STRATEGY_CHANGES_TOTAL, "strategy" => selected.kind.to_string())
                    .increment(1);
                if let Some(callback) = &callbacks.on_strategy_change {
                    callback(&active, &selected);
                }
                self.state().current = selected.clone();
                active = selected;
                outcome.stats.strategy_changes += 1;
            }

            let take = active.max_batch_size.min(remaining.len());
            let batch: Vec<T> = remaining.drain(..take).collect();
            let batch_len = batch.len();
            outcome.stats.batches += 1;
            let batch_index = outcome.stats.batches;
            debug!(batch_index, batch_len, approach = ?active.approach, "executing batch");

            let backup = batch.clone();
            match executor::execute(
                active.approach,
                batch,
                &processor,
                self.config.parallelism,
                reclaim,
                cancel,
            )
            .await
            {
                Ok(BatchRun {
                    results,
                    remaining: untouched,
                }) => {
                    completed += batch_len - untouched.len();
                    outcome.results.extend(results);
                    for item in untouched.into_iter().rev() {
                        remaining.push_front(item);
                    }
                }
                Err(error) => {
                    warn!(batch_index, batch_len, error = %error, "batch failed, continuing");
                    completed += batch_len;
                    outcome.failures.push(BatchFailure {
                        items: backup,
                        error,
                    });
                }
            }

            let after = self.snapshot();
            let usage = after.usage_percent;
            memory_sum += usage;
            outcome.stats.peak_memory_percent = outcome.stats.peak_memory_percent.max(usage);
            metrics::gauge!(telemetry::MEMORY_USAGE_PERCENT).set(usage);
            let above_high = usage > self.config.thresholds.high;
            if above_high {
                warn!(usage_percent = usage, "memory usage above high threshold");
                if let Some(callback) = &callbacks.on_memory_warning {
                    callback(&after);
                }
            }
            self.push_snapshot(after);

            if usage >= self.config.emergency_cleanup_threshold
                || batch_index % active.cleanup_every_n_batches.max(1) == 0
                || above_high
            {
                self.cleanup_with(reclaim).await;
                outcome.stats.cleanups += 1;
            }

            if let Some(progress) = &callbacks.on_progress {
                progress(completed, total);
            }
        }

        if outcome.cancelled {
            outcome.unprocessed = remaining.into();
            info!(
                unprocessed = outcome.unprocessed.len(),
                "processing cancelled"
            );
        }
        if outcome.stats.batches > 0 {
            outcome.stats.average_memory_percent = memory_sum / outcome.stats.batches as f64;
        }
        outcome.stats.duration = started.elapsed();
        outcome
    }

    /// Reclaim hint (when enabled), a cooperative yield, then a history trim.
    pub async fn cleanup(&self) {
        let reclaim = self
            .reclaim
            .as_ref()
            .filter(|_| self.config.enable_reclaim_hints);
        self.cleanup_with(reclaim).await;
    }

    async fn cleanup_with(&self, reclaim: Option<&ReclaimHook>) {
        if let Some(hook) = reclaim {
            hook();
        }
        tokio::task::yield_now().await;
        let mut state = self.state();
        let excess = state.history.len().saturating_sub(CLEANUP_HISTORY_KEEP);
        state.history.drain(..excess);
    }

    pub fn get_processing_recommendations(&self) -> ProcessingRecommendations {
        let snapshot = self.current_memory_usage();
        let strategy = self.select_optimal_strategy(&snapshot);
        let thresholds = &self.config.thresholds;
        let usage = snapshot.usage_percent;

        let mut guidance = Vec::new();
        if usage >= thresholds.critical {
            guidance.push(format!(
                "memory usage {usage:.1}% is critical: process sequentially in small batches and release caches"
            ));
        } else if usage >= thresholds.high {
            guidance.push(format!(
                "memory usage {usage:.1}% is high: prefer streaming with frequent cleanup"
            ));
        } else if usage >= thresholds.normal {
            guidance.push(format!(
                "memory usage {usage:.1}% is moderate: chunked processing is appropriate"
            ));
        } else if usage >= thresholds.low {
            guidance.push(format!(
                "memory usage {usage:.1}% is comfortable: parallel processing is available"
            ));
        } else {
            guidance.push(format!(
                "memory usage {usage:.1}% is low: larger batches are safe"
            ));
        }

        let per_item = self.config.assumed_item_bytes as f64 * strategy.memory_overhead.max(f64::EPSILON);
        let estimated_capacity = if per_item > 0.0 {
            (snapshot.available_for_processing as f64 / per_item).floor() as u64
        } else {
            0
        };
        if estimated_capacity < strategy.max_batch_size as u64 {
            guidance.push(format!(
                "estimated capacity of {estimated_capacity} items is below the {} batch size of {}",
                strategy.kind, strategy.max_batch_size
            ));
        }

        ProcessingRecommendations {
            strategy,
            snapshot,
            guidance,
            estimated_capacity,
        }
    }

    /// Start the periodic memory monitor.
    ///
    /// A no-op while a monitor is already running. The task holds a weak
    /// reference and ends with the selector.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn spawn_monitor(self: &Arc<Self>) {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let token = CancellationToken::new();
        spawn_monitor_task(
            Arc::downgrade(self),
            token.clone(),
            self.config.monitoring_interval,
        );
        *slot = Some(token);
    }

    /// Stop the monitor. Idempotent.
    pub fn stop(&self) {
        let mut slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.take() {
            token.cancel();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        let slot = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().is_some_and(|token| !token.is_cancelled())
    }

    /// Take and record one monitor snapshot.
    pub fn sample(&self) -> ResourceSnapshot {
        let snapshot = self.snapshot();
        metrics::gauge!(telemetry::MEMORY_USAGE_PERCENT).set(snapshot.usage_percent);
        if snapshot.usage_percent >= self.config.thresholds.critical {
            warn!(
                usage_percent = snapshot.usage_percent,
                available = snapshot.available_memory,
                "memory usage critical"
            );
        }
        self.push_snapshot(snapshot.clone());
        snapshot
    }

    fn push_snapshot(&self, snapshot: ResourceSnapshot) {
        let mut state = self.state();
        state.history.push_back(snapshot);
        while state.history.len() > self.config.history_capacity {
            state.history.pop_front();
        }
    }

    fn state(&self) -> MutexGuard<'_, SelectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ResourceStrategySelector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ResourceStrategySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStrategySelector")
            .field("probe", &self.probe.name())
            .field("profiles", &self.profiles.len())
            .field("current", &self.current_strategy().kind)
            .finish()
    }
}

/// Profile index per band: a profile of the band's own kind, otherwise
/// `round(i * (n - 1) / 3)` over the size-sorted list.
fn resolve_bands(profiles: &[StrategyProfile]) -> [usize; 4] {
    let last = profiles.len().saturating_sub(1);
    PressureBand::ALL.map(|band| {
        profiles
            .iter()
            .position(|p| p.kind == band.kind())
            .unwrap_or_else(|| ((band.index() * last) as f64 / 3.0).round() as usize)
    })
}

fn spawn_monitor_task(selector: Weak<ResourceStrategySelector>, token: CancellationToken, period: Duration) {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let Some(selector) = selector.upgrade() else { break };
                    selector.sample();
                }
            }
        }
    });
}
