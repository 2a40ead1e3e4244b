//! Strategy profiles, pressure bands and memory configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;

/// Named class of a strategy profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Emergency,
    Conservative,
    Balanced,
    Aggressive,
    /// Host-defined profile. Only reachable through index fallback.
    Custom(String),
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emergency => f.write_str("emergency"),
            Self::Conservative => f.write_str("conservative"),
            Self::Balanced => f.write_str("balanced"),
            Self::Aggressive => f.write_str("aggressive"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// How a batch's items are dispatched to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionApproach {
    /// One item per call.
    Sequential,
    /// Core-count chunks joined concurrently.
    Parallel,
    /// Fixed small sub-chunks with a yield between them.
    Streaming,
    /// About four equal sub-chunks, one after another.
    Chunked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub kind: StrategyKind,
    pub max_batch_size: usize,
    pub approach: ExecutionApproach,
    /// Run cleanup after every n-th batch.
    pub cleanup_every_n_batches: usize,
    /// Memory multiplier per item relative to a plain sequential run.
    pub memory_overhead: f64,
    pub cpu_overhead: f64,
}

impl StrategyProfile {
    pub fn new(kind: StrategyKind, max_batch_size: usize, approach: ExecutionApproach) -> Self {
        Self {
            kind,
            max_batch_size: max_batch_size.max(1),
            approach,
            cleanup_every_n_batches: 1,
            memory_overhead: 1.0,
            cpu_overhead: 1.0,
        }
    }

    pub fn cleanup_every(mut self, n: usize) -> Self {
        self.cleanup_every_n_batches = n.max(1);
        self
    }

    pub fn overheads(mut self, memory: f64, cpu: f64) -> Self {
        self.memory_overhead = memory;
        self.cpu_overhead = cpu;
        self
    }

    /// The four built-in profiles, smallest first.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(StrategyKind::Emergency, 4, ExecutionApproach::Sequential)
                .cleanup_every(1)
                .overheads(1.0, 0.25),
            Self::new(StrategyKind::Conservative, 16, ExecutionApproach::Streaming)
                .cleanup_every(2)
                .overheads(1.2, 0.5),
            Self::new(StrategyKind::Balanced, 32, ExecutionApproach::Chunked)
                .cleanup_every(5)
                .overheads(1.5, 0.75),
            Self::new(StrategyKind::Aggressive, 64, ExecutionApproach::Parallel)
                .cleanup_every(10)
                .overheads(2.0, 1.0),
        ]
    }
}

/// Memory pressure band, from most to least constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureBand {
    Emergency,
    Conservative,
    Balanced,
    Aggressive,
}

impl PressureBand {
    pub const ALL: [Self; 4] = [
        Self::Emergency,
        Self::Conservative,
        Self::Balanced,
        Self::Aggressive,
    ];

    /// Band for a usage percent.
    pub fn for_usage(usage_percent: f64, thresholds: &MemoryThresholds) -> Self {
        if usage_percent >= thresholds.critical {
            Self::Emergency
        } else if usage_percent >= thresholds.high {
            Self::Conservative
        } else if usage_percent >= thresholds.normal {
            Self::Balanced
        } else {
            Self::Aggressive
        }
    }

    /// Position used for index fallback: 0 is the most constrained.
    pub fn index(self) -> usize {
        match self {
            Self::Emergency => 0,
            Self::Conservative => 1,
            Self::Balanced => 2,
            Self::Aggressive => 3,
        }
    }

    pub fn kind(self) -> StrategyKind {
        match self {
            Self::Emergency => StrategyKind::Emergency,
            Self::Conservative => StrategyKind::Conservative,
            Self::Balanced => StrategyKind::Balanced,
            Self::Aggressive => StrategyKind::Aggressive,
        }
    }
}

/// Usage-percent thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryThresholds {
    pub critical: f64,
    pub high: f64,
    pub normal: f64,
    /// Only affects guidance text.
    pub low: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            critical: 90.0,
            high: 75.0,
            normal: 60.0,
            low: 40.0,
        }
    }
}

/// Configuration for the strategy selector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub thresholds: MemoryThresholds,
    #[serde(rename = "monitoring_interval_ms", with = "duration_ms")]
    pub monitoring_interval: Duration,
    /// Call the reclaim hook during cleanup.
    pub enable_reclaim_hints: bool,
    /// Usage percent at or above which every batch is followed by cleanup.
    pub emergency_cleanup_threshold: f64,
    /// Bytes held back from `available_for_processing`.
    pub memory_buffer: u64,
    /// Per-item footprint used for capacity estimates.
    pub assumed_item_bytes: u64,
    /// Divisor for parallel chunking.
    pub parallelism: usize,
    /// Monitor snapshots retained.
    pub history_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            thresholds: MemoryThresholds::default(),
            monitoring_interval: Duration::from_secs(5),
            enable_reclaim_hints: false,
            emergency_cleanup_threshold: 85.0,
            memory_buffer: 512 * 1024 * 1024,
            assumed_item_bytes: 64 * 1024,
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            history_capacity: 1000,
        }
    }
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thresholds(mut self, critical: f64, high: f64, normal: f64, low: f64) -> Self {
        self.thresholds = MemoryThresholds {
            critical,
            high,
            normal,
            low,
        };
        self
    }

    pub fn monitoring_interval(mut self, interval: Duration) -> Self {
        self.monitoring_interval = interval;
        self
    }

    pub fn reclaim_hints(mut self, enabled: bool) -> Self {
        self.enable_reclaim_hints = enabled;
        self
    }

    pub fn emergency_cleanup_threshold(mut self, percent: f64) -> Self {
        self.emergency_cleanup_threshold = percent;
        self
    }

    pub fn memory_buffer(mut self, bytes: u64) -> Self {
        self.memory_buffer = bytes;
        self
    }

    pub fn assumed_item_bytes(mut self, bytes: u64) -> Self {
        self.assumed_item_bytes = bytes;
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    pub fn history_capacity(mut self, n: usize) -> Self {
        self.history_capacity = n;
        self
    }
}
