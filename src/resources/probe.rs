use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, get_current_pid};
use tracing::warn;

use crate::types::{ProcessMemory, ResourceReading};

/// Source of memory and CPU readings.
pub trait ResourceProbe: Send + Sync {
    /// Probe name for logging/debugging.
    fn name(&self) -> &str;

    /// Take a reading now.
    fn read(&self) -> ResourceReading;
}

// ============================================================================
// SysinfoProbe
// ============================================================================

/// Live probe backed by a cached `sysinfo::System`.
///
/// Only memory and the current process are refreshed on each read.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
    cores: usize,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = match get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "cannot resolve current pid, process metrics disabled");
                None
            }
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            system: Mutex::new(System::new()),
            pid,
            cores,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn read(&self) -> ResourceReading {
        // System carries no invariant worth refusing a reading over.
        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_memory();

        let mut process = ProcessMemory::default();
        let mut cpu_percent = 0.0;
        if let Some(pid) = self.pid {
            sys.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing().with_memory().with_cpu(),
            );
            if let Some(p) = sys.process(pid) {
                process = ProcessMemory {
                    resident: p.memory(),
                    virtual_memory: p.virtual_memory(),
                };
                cpu_percent = (f64::from(p.cpu_usage()) / self.cores as f64).clamp(0.0, 100.0);
            }
        }

        ResourceReading {
            total_memory: sys.total_memory(),
            available_memory: sys.available_memory(),
            process,
            cpu_percent,
        }
    }
}

// ============================================================================
// StaticProbe
// ============================================================================

/// Probe that reports whatever it was last told.
///
/// Percentages are stored as `f64` bits in atomics so the probe can be
/// adjusted from another task while a batch run is reading it.
pub struct StaticProbe {
    total_memory: u64,
    memory_percent: AtomicU64,
    cpu_percent: AtomicU64,
}

/// Total memory reported by [`StaticProbe::new`]: 16 GiB.
const STATIC_TOTAL_MEMORY: u64 = 16 * 1024 * 1024 * 1024;

impl StaticProbe {
    pub fn new(memory_percent: f64, cpu_percent: f64) -> Self {
        Self::with_total_memory(STATIC_TOTAL_MEMORY, memory_percent, cpu_percent)
    }

    pub fn with_total_memory(total_memory: u64, memory_percent: f64, cpu_percent: f64) -> Self {
        Self {
            total_memory,
            memory_percent: AtomicU64::new(memory_percent.clamp(0.0, 100.0).to_bits()),
            cpu_percent: AtomicU64::new(cpu_percent.clamp(0.0, 100.0).to_bits()),
        }
    }

    pub fn set_memory_percent(&self, percent: f64) {
        self.memory_percent
            .store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    pub fn set_cpu_percent(&self, percent: f64) {
        self.cpu_percent
            .store(percent.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    pub fn memory_percent(&self) -> f64 {
        f64::from_bits(self.memory_percent.load(Ordering::Relaxed))
    }

    pub fn cpu_percent(&self) -> f64 {
        f64::from_bits(self.cpu_percent.load(Ordering::Relaxed))
    }
}

impl ResourceProbe for StaticProbe {
    fn name(&self) -> &str {
        "static"
    }

    fn read(&self) -> ResourceReading {
        let used = (self.total_memory as f64 * self.memory_percent() / 100.0).round() as u64;
        ResourceReading {
            total_memory: self.total_memory,
            available_memory: self.total_memory.saturating_sub(used),
            process: ProcessMemory::default(),
            cpu_percent: self.cpu_percent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_probe_reports_configured_percent() {
        let probe = StaticProbe::new(75.0, 20.0);
        let reading = probe.read();
        assert!((reading.memory_percent() - 75.0).abs() < 1e-6);
        assert_eq!(reading.cpu_percent, 20.0);
    }

    #[test]
    fn static_probe_clamps() {
        let probe = StaticProbe::new(150.0, -3.0);
        assert_eq!(probe.memory_percent(), 100.0);
        assert_eq!(probe.cpu_percent(), 0.0);
    }

    #[test]
    fn static_probe_can_be_adjusted() {
        let probe = StaticProbe::new(10.0, 10.0);
        probe.set_memory_percent(95.0);
        assert!((probe.read().memory_percent() - 95.0).abs() < 1e-6);
    }

    #[test]
    fn sysinfo_probe_reads_memory() {
        let probe = SysinfoProbe::new();
        let reading = probe.read();
        assert!(reading.total_memory > 0);
        assert!(reading.available_memory <= reading.total_memory);
    }
}
