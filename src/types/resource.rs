//! Point-in-time resource readings

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Memory held by the current process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMemory {
    pub resident: u64,
    pub virtual_memory: u64,
}

/// Raw reading produced by a [`ResourceProbe`](crate::resources::ResourceProbe).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceReading {
    pub total_memory: u64,
    pub available_memory: u64,
    pub process: ProcessMemory,
    /// Process CPU usage normalised to 0..=100 across all cores.
    pub cpu_percent: f64,
}

impl ResourceReading {
    /// System memory in use, as a percent of total (0 when total is unknown).
    pub fn memory_percent(&self) -> f64 {
        if self.total_memory == 0 {
            return 0.0;
        }
        let used = self.total_memory.saturating_sub(self.available_memory);
        used as f64 / self.total_memory as f64 * 100.0
    }
}

/// Memory snapshot used for strategy selection.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    pub total_memory: u64,
    pub available_memory: u64,
    pub process: ProcessMemory,
    pub usage_percent: f64,
    /// Available memory minus the configured safety buffer.
    pub available_for_processing: u64,
    pub cpu_percent: f64,
    pub taken_at: Instant,
}

impl ResourceSnapshot {
    pub fn from_reading(reading: ResourceReading, memory_buffer: u64) -> Self {
        Self {
            total_memory: reading.total_memory,
            available_memory: reading.available_memory,
            process: reading.process,
            usage_percent: reading.memory_percent(),
            available_for_processing: reading.available_memory.saturating_sub(memory_buffer),
            cpu_percent: reading.cpu_percent,
            taken_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_percent_from_total_and_available() {
        let reading = ResourceReading {
            total_memory: 1000,
            available_memory: 250,
            ..Default::default()
        };
        assert!((reading.memory_percent() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn memory_percent_zero_total() {
        assert_eq!(ResourceReading::default().memory_percent(), 0.0);
    }

    #[test]
    fn buffer_saturates() {
        let reading = ResourceReading {
            total_memory: 1000,
            available_memory: 100,
            ..Default::default()
        };
        let snapshot = ResourceSnapshot::from_reading(reading, 500);
        assert_eq!(snapshot.available_for_processing, 0);
        assert!((snapshot.usage_percent - 90.0).abs() < 1e-9);
    }
}
