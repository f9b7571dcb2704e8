//! Failure ledger.
//!
//! Tracks repeated-failure history per resource identity and permanently
//! suppresses identities that keep failing over a long observation window:
//! - every failure bumps a counter; the first one stamps the window start
//! - a success forgives the identity (its record is dropped)
//! - at `suppress_after_failures` failures *and* `observation_window_days`
//!   since the first one, the identity moves to the suppressed set for good
//!
//! State is persisted through a [`LedgerStore`] so suppression survives
//! restarts. A missing or unreadable store yields an empty ledger.

mod persist;
mod record;
mod sqlite;
mod state;

use anyhow::Result;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{LedgerBackend, LedgerConfig};

pub use persist::{JsonLedgerStore, LedgerStore};
pub use record::{FailureRecord, SuppressionRule};
pub use sqlite::SqliteLedgerStore;
pub use state::{FailureLedger, PersistedLedger, PersistedRecord};

/// Current time as Unix seconds.
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Open the store selected by `[ledger] backend` at its default XDG location.
pub async fn open_store(cfg: &LedgerConfig) -> Result<Arc<dyn LedgerStore>> {
    let store: Arc<dyn LedgerStore> = match cfg.backend {
        LedgerBackend::Json => Arc::new(JsonLedgerStore::new(JsonLedgerStore::default_path()?)),
        LedgerBackend::Sqlite => Arc::new(SqliteLedgerStore::open_default().await?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    fn ledger() -> FailureLedger {
        FailureLedger::new(SuppressionRule::default())
    }

    #[test]
    fn thirteen_failures_within_a_week_do_not_suppress() {
        let mut ledger = ledger();
        for i in 0..13 {
            assert!(!ledger.record_failure_at("img", i * DAY / 2));
        }
        assert!(!ledger.is_suppressed("img"));
        assert_eq!(ledger.record("img").unwrap().failure_count, 13);
    }

    #[test]
    fn fourteenth_failure_after_day_seven_suppresses() {
        let mut ledger = ledger();
        for i in 0..13 {
            ledger.record_failure_at("img", i * DAY / 2);
        }
        assert!(ledger.record_failure_at("img", 8 * DAY));
        assert!(ledger.is_suppressed("img"));
        // Promoted entries leave the countable record set.
        assert!(ledger.record("img").is_none());
    }

    #[test]
    fn fourteen_quick_failures_wait_for_the_window() {
        let mut ledger = ledger();
        for i in 0..14 {
            assert!(!ledger.record_failure_at("img", i));
        }
        assert!(!ledger.is_suppressed("img"));
        assert!(ledger.sweep_at(6 * DAY).is_empty());
        assert_eq!(ledger.sweep_at(7 * DAY), vec!["img".to_string()]);
        assert!(ledger.is_suppressed("img"));
    }

    #[test]
    fn success_forgives_and_restarts_the_window() {
        let mut ledger = ledger();
        for _ in 0..13 {
            ledger.record_failure_at("img", 0);
        }
        ledger.record_success("img");
        assert!(ledger.record("img").is_none());

        // The next failure opens a fresh window at day 8.
        assert!(!ledger.record_failure_at("img", 8 * DAY));
        let record = ledger.record("img").unwrap();
        assert_eq!(record.failure_count, 1);
        assert_eq!(record.first_failure_at, 8 * DAY);
        assert!(!ledger.is_suppressed("img"));
    }

    #[test]
    fn suppression_is_irreversible() {
        let mut ledger = ledger();
        for _ in 0..14 {
            ledger.record_failure_at("img", 0);
        }
        ledger.sweep_at(10 * DAY);
        assert!(ledger.is_suppressed("img"));
        ledger.record_success("img");
        assert!(ledger.is_suppressed("img"));
        assert!(!ledger.record_failure_at("img", 11 * DAY));
        assert!(ledger.record("img").is_none());
    }
}
