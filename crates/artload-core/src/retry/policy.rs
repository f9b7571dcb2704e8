use std::time::Duration;

use crate::config::RetryConfig;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop; the request is abandoned.
    GiveUp,
    /// Re-submit after the given delay.
    RetryAfter(Duration),
}

/// Bounded retry policy with a delay that grows with each failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Failure count at which the request is abandoned.
    pub max_retries: u32,
    /// Delay unit; the n-th failure waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.base_delay(),
        }
    }

    /// Decide what to do after the `failures`-th retryable failure (1-based).
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if failures >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(failures.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_failure_count() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1), RetryDecision::RetryAfter(Duration::from_secs(2)));
        assert_eq!(p.decide(2), RetryDecision::RetryAfter(Duration::from_secs(4)));
    }

    #[test]
    fn gives_up_at_bound() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(3), RetryDecision::GiveUp);
        assert_eq!(p.decide(4), RetryDecision::GiveUp);
    }

    #[test]
    fn zero_bound_never_retries() {
        let p = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(p.decide(1), RetryDecision::GiveUp);
    }
}
