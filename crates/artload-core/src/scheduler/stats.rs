//! Scheduler counters for status displays and tests.

/// Snapshot of scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Loads currently holding a concurrency slot.
    pub active: usize,
    /// Requests waiting in the pending queue.
    pub pending: usize,
    /// Request ids that finished successfully and have not been cleared.
    pub completed: usize,
    /// Retries scheduled since the scheduler was created.
    pub total_retries: u64,
    /// Requests currently sleeping out a retry delay.
    pub retry_waiting: usize,
    /// Identities the failure ledger has permanently suppressed.
    pub suppressed_identities: usize,
    /// Highest `active` value observed.
    pub peak_active: usize,
    /// Whether only critical requests may start.
    pub backgrounded: bool,
}

impl SchedulerStats {
    /// Requests accepted but not yet terminal.
    pub fn in_flight(&self) -> usize {
        self.active + self.pending + self.retry_waiting
    }

    /// True when nothing is running, queued or waiting to retry.
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}
