//! In-memory failure ledger.

mod snapshot;

use std::collections::{HashMap, HashSet};

use super::record::{FailureRecord, SuppressionRule};
use super::unix_timestamp;

pub use snapshot::{PersistedLedger, PersistedRecord};

/// Outstanding failure records plus the permanent suppressed set.
///
/// Every mutating call marks the ledger dirty; the owner persists it and
/// clears the flag with `take_dirty`.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    pub(super) records: HashMap<String, FailureRecord>,
    pub(super) suppressed: HashSet<String>,
    pub(super) rule: SuppressionRule,
    dirty: bool,
}

impl FailureLedger {
    pub fn new(rule: SuppressionRule) -> Self {
        Self {
            records: HashMap::new(),
            suppressed: HashSet::new(),
            rule,
            dirty: false,
        }
    }

    pub fn rule(&self) -> SuppressionRule {
        self.rule
    }

    /// Record a failure now. Returns true if this failure suppressed the identity.
    pub fn record_failure(&mut self, identity: &str) -> bool {
        self.record_failure_at(identity, unix_timestamp())
    }

    /// Record a failure at `now` (Unix seconds).
    pub fn record_failure_at(&mut self, identity: &str, now: u64) -> bool {
        if self.suppressed.contains(identity) {
            return false;
        }
        let record = self
            .records
            .entry(identity.to_string())
            .or_insert_with(|| FailureRecord::new(identity.to_string(), now));
        record.failure_count = record.failure_count.saturating_add(1);
        self.dirty = true;

        let eligible = self.rule.is_eligible(record, now);
        if eligible {
            self.promote(identity);
        }
        eligible
    }

    /// Forget the failure history of a non-suppressed identity.
    pub fn record_success(&mut self, identity: &str) {
        if self.records.remove(identity).is_some() {
            self.dirty = true;
        }
    }

    pub fn is_suppressed(&self, identity: &str) -> bool {
        self.suppressed.contains(identity)
    }

    /// Re-evaluate every outstanding record now; see [`Self::sweep_at`].
    pub fn sweep(&mut self) -> Vec<String> {
        self.sweep_at(unix_timestamp())
    }

    /// Promote records that aged past the window without a new failure.
    /// Returns the newly suppressed identities.
    pub fn sweep_at(&mut self, now: u64) -> Vec<String> {
        let mut promoted: Vec<String> = self
            .records
            .values()
            .filter(|r| self.rule.is_eligible(r, now))
            .map(|r| r.identity.clone())
            .collect();
        promoted.sort();
        for identity in &promoted {
            self.promote(identity);
        }
        promoted
    }

    fn promote(&mut self, identity: &str) {
        self.records.remove(identity);
        self.suppressed.insert(identity.to_string());
        self.dirty = true;
        tracing::info!(identity, "resource permanently suppressed after repeated failures");
    }

    pub fn record(&self, identity: &str) -> Option<&FailureRecord> {
        self.records.get(identity)
    }

    pub fn records(&self) -> impl Iterator<Item = &FailureRecord> {
        self.records.values()
    }

    pub fn suppressed(&self) -> impl Iterator<Item = &str> {
        self.suppressed.iter().map(String::as_str)
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed.len()
    }

    pub fn outstanding_count(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the ledger changed since the last call, and resets the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Build a serializable snapshot for persistence.
    pub fn to_snapshot(&self) -> PersistedLedger {
        snapshot::to_snapshot(self)
    }

    /// Restore from a persisted snapshot; the rule comes from current config.
    pub fn from_snapshot(snapshot: PersistedLedger, rule: SuppressionRule) -> Self {
        snapshot::from_snapshot(snapshot, rule)
    }
}
