//! Per-identity failure record and the suppression rule applied to it.

use crate::config::LedgerConfig;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Failure history of one resource identity within the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub identity: String,
    pub failure_count: u32,
    /// Unix seconds of the first failure since the last success.
    pub first_failure_at: u64,
}

impl FailureRecord {
    pub(super) fn new(identity: String, now: u64) -> Self {
        Self {
            identity,
            failure_count: 0,
            first_failure_at: now,
        }
    }
}

/// Both thresholds must be met before an identity is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionRule {
    pub min_failures: u32,
    pub window_secs: u64,
}

impl Default for SuppressionRule {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl SuppressionRule {
    pub fn from_config(cfg: &LedgerConfig) -> Self {
        Self {
            min_failures: cfg.suppress_after_failures,
            window_secs: cfg.observation_window_days.saturating_mul(SECS_PER_DAY),
        }
    }

    pub fn is_eligible(&self, record: &FailureRecord, now: u64) -> bool {
        record.failure_count >= self.min_failures
            && now.saturating_sub(record.first_failure_at) >= self.window_secs
    }
}
