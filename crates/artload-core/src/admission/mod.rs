//! Admission control.
//!
//! Decides whether a request may start fetching now, must wait in the queue,
//! or must wait *and* lose its priority because memory is tight:
//!
//! | memory          | priority      | slot free | decision    |
//! |-----------------|---------------|-----------|-------------|
//! | below high-water| any           | yes       | `Admit`     |
//! | below high-water| any           | no        | `Defer`     |
//! | at/above        | >= cutoff     | yes       | `Admit`     |
//! | at/above        | >= cutoff     | no        | `Defer`     |
//! | at/above        | < cutoff      | any       | `Downgrade` |

mod memory;

use std::sync::Arc;

use crate::config::AdmissionConfig;
use crate::request::Priority;

pub use memory::{MemoryProbe, MemoryUsage, StaticMemoryProbe, SystemMemoryProbe};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Start now.
    Admit,
    /// Queue at the current priority.
    Defer,
    /// Queue at the lowest priority.
    Downgrade,
}

pub struct AdmissionController {
    probe: Arc<dyn MemoryProbe>,
    high_water: f64,
    cutoff: Priority,
    max_concurrent: usize,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("high_water", &self.high_water)
            .field("cutoff", &self.cutoff)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

impl AdmissionController {
    pub fn new(cfg: &AdmissionConfig, max_concurrent: usize, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            high_water: cfg.memory_high_water.clamp(0.0, 1.0),
            cutoff: cfg.priority_cutoff,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn sample(&self) -> MemoryUsage {
        self.probe.sample()
    }

    pub fn under_pressure(&self, usage: MemoryUsage) -> bool {
        usage.total_bytes > 0 && usage.fraction() >= self.high_water
    }

    /// The lowest priority allowed to start under `usage`, or `None` when
    /// memory is below the high-water mark.
    pub fn pressure_cutoff(&self, usage: MemoryUsage) -> Option<Priority> {
        self.under_pressure(usage).then_some(self.cutoff)
    }

    /// Sample memory now and decide for `priority` given `active` running loads.
    pub fn can_admit(&self, priority: Priority, active: usize) -> Admission {
        self.decide(priority, active, self.sample())
    }

    /// Decide against an already-taken memory sample.
    pub fn decide(&self, priority: Priority, active: usize, usage: MemoryUsage) -> Admission {
        let slot_free = active < self.max_concurrent;
        if self.under_pressure(usage) && priority < self.cutoff {
            return Admission::Downgrade;
        }
        if slot_free {
            Admission::Admit
        } else {
            Admission::Defer
        }
    }
}
