//! Serializable snapshot types and conversion for FailureLedger persistence.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::ledger::record::{FailureRecord, SuppressionRule};

use super::FailureLedger;

/// Serializable failure record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub identity: String,
    pub failure_count: u32,
    pub first_failure_at: u64,
}

/// Snapshot of FailureLedger: the two persisted collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLedger {
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default)]
    pub suppressed: Vec<String>,
    #[serde(default)]
    pub records: Vec<PersistedRecord>,
}

fn default_version() -> u8 {
    1
}

/// Build a snapshot with deterministic ordering (sorted by identity).
pub(super) fn to_snapshot(ledger: &FailureLedger) -> PersistedLedger {
    let mut suppressed: Vec<String> = ledger.suppressed.iter().cloned().collect();
    suppressed.sort();
    let mut records: Vec<PersistedRecord> = ledger
        .records
        .values()
        .map(|r| PersistedRecord {
            identity: r.identity.clone(),
            failure_count: r.failure_count,
            first_failure_at: r.first_failure_at,
        })
        .collect();
    records.sort_by(|a, b| a.identity.cmp(&b.identity));
    PersistedLedger {
        version: 1,
        suppressed,
        records,
    }
}

/// Restore a ledger. Records for identities that are already suppressed are dropped.
pub(super) fn from_snapshot(snapshot: PersistedLedger, rule: SuppressionRule) -> FailureLedger {
    let suppressed: HashSet<String> = snapshot.suppressed.into_iter().collect();
    let records: HashMap<String, FailureRecord> = snapshot
        .records
        .into_iter()
        .filter(|r| !suppressed.contains(&r.identity))
        .map(|r| {
            (
                r.identity.clone(),
                FailureRecord {
                    identity: r.identity,
                    failure_count: r.failure_count,
                    first_failure_at: r.first_failure_at,
                },
            )
        })
        .collect();
    let mut ledger = FailureLedger::new(rule);
    ledger.records = records;
    ledger.suppressed = suppressed;
    ledger
}
