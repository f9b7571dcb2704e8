//! Resident memory sampling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sysinfo::{MemoryRefreshKind, Process, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

/// Point-in-time memory reading for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub total_bytes: u64,
}

impl MemoryUsage {
    /// Resident share of total memory in [0.0, 1.0]; 0 when total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.resident_bytes as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// Source of memory readings. Sampled on demand by admission and lifecycle.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemoryUsage;
}

/// Reads process RSS and total RAM through sysinfo. Readings are reused for
/// `max_age` so bursts of submissions do not each pay for a refresh.
pub struct SystemMemoryProbe {
    max_age: Duration,
    last: Mutex<Option<(Instant, MemoryUsage)>>,
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl SystemMemoryProbe {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            last: Mutex::new(None),
        }
    }

    fn read() -> MemoryUsage {
        let mut system = System::new_with_specifics(RefreshKind::nothing());
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        let total_bytes = system.total_memory();

        let resident_bytes = match sysinfo::get_current_pid() {
            Ok(pid) => {
                system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    false,
                    ProcessRefreshKind::nothing().with_memory(),
                );
                system.process(pid).map(Process::memory).unwrap_or(0)
            }
            Err(e) => {
                tracing::debug!("memory probe: no current pid: {e}");
                0
            }
        };

        MemoryUsage {
            resident_bytes,
            total_bytes,
        }
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&self) -> MemoryUsage {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((at, usage)) = *last {
            if at.elapsed() < self.max_age {
                return usage;
            }
        }
        let usage = Self::read();
        *last = Some((Instant::now(), usage));
        usage
    }
}

/// Probe whose reading is set explicitly; for tests and embedders that
/// already track memory themselves.
#[derive(Debug, Default)]
pub struct StaticMemoryProbe {
    resident_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

impl StaticMemoryProbe {
    pub fn new(resident_bytes: u64, total_bytes: u64) -> Self {
        Self {
            resident_bytes: AtomicU64::new(resident_bytes),
            total_bytes: AtomicU64::new(total_bytes),
        }
    }

    pub fn set_resident(&self, bytes: u64) {
        self.resident_bytes.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryProbe for StaticMemoryProbe {
    fn sample(&self) -> MemoryUsage {
        MemoryUsage {
            resident_bytes: self.resident_bytes.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_unknown_total() {
        assert_eq!(MemoryUsage::default().fraction(), 0.0);
        let usage = MemoryUsage {
            resident_bytes: 3,
            total_bytes: 4,
        };
        assert!((usage.fraction() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn system_probe_reports_nonzero_total() {
        let usage = SystemMemoryProbe::default().sample();
        assert!(usage.total_bytes > 0);
    }

    #[test]
    fn static_probe_reflects_updates() {
        let probe = StaticMemoryProbe::new(10, 100);
        assert_eq!(probe.sample().resident_bytes, 10);
        probe.set_resident(90);
        assert_eq!(probe.sample().resident_bytes, 90);
    }
}
