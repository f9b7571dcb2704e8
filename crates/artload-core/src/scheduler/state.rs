//! Scheduler state machine.
//!
//! All bookkeeping lives in [`SchedulerState`] and is only touched while the
//! scheduler's mutex is held. Transitions never await; anything that must
//! happen outside the lock (spawning loads, arming retry timers, persisting
//! the ledger) is returned as [`Effects`] for the caller to apply.
//!
//! Queued requests below the admission cutoff stay queued while the last
//! memory sample was at or above the high-water mark.
//!
//! A request id is in at most one of `active`, `pending`, `waiting` (retry
//! delay) or `completed` at any time.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmissionController, MemoryUsage};
use crate::artifact::Artifact;
use crate::ledger::FailureLedger;
use crate::request::{LoadHandle, LoadOutcome, LoadProgress, LoadRequest, Priority, Submission};
use crate::retry::{FetchFailure, LoadError, RetryDecision, RetryPolicy};

use super::queue::PendingQueue;
use super::stats::SchedulerStats;

/// An accepted request together with the sender that resolves its handle.
pub(crate) struct Tracked {
    pub(crate) request: LoadRequest,
    responder: oneshot::Sender<LoadOutcome>,
}

impl Tracked {
    fn resolve(self, outcome: LoadOutcome) {
        let _ = self.responder.send(outcome);
    }
}

/// A load holding a concurrency slot. Dropping it cancels the load task.
struct ActiveLoad {
    tracked: Tracked,
    ticket: u64,
    _cancel: oneshot::Sender<()>,
}

/// A request sleeping out its retry delay. Dropping it cancels the timer.
struct RetryWait {
    tracked: Tracked,
    ticket: u64,
    _cancel: oneshot::Sender<()>,
}

/// What a load task needs, detached from the state.
#[derive(Debug, Clone)]
pub(crate) struct LoadJob {
    pub(crate) ticket: u64,
    pub(crate) attempt: u32,
    pub(crate) request: LoadRequest,
}

pub(crate) struct StartPlan {
    pub(crate) job: LoadJob,
    pub(crate) cancel: oneshot::Receiver<()>,
}

pub(crate) struct RetryPlan {
    pub(crate) id: String,
    pub(crate) ticket: u64,
    pub(crate) delay: Duration,
    pub(crate) cancel: oneshot::Receiver<()>,
}

/// Result of one load attempt, fed back into the state machine.
#[derive(Debug)]
pub(crate) enum Attempt {
    CacheHit(Artifact),
    Fetched(Artifact),
    Failed(FetchFailure),
}

/// Work to perform after the lock is released.
#[derive(Default)]
pub(crate) struct Effects {
    pub(crate) starts: Vec<StartPlan>,
    pub(crate) retry: Option<RetryPlan>,
    pub(crate) persist: bool,
}

pub(crate) struct SchedulerState {
    active: HashMap<String, ActiveLoad>,
    pending: PendingQueue<Tracked>,
    waiting: HashMap<String, RetryWait>,
    completed: HashSet<String>,
    retry_counts: HashMap<String, u32>,
    non_retryable: HashSet<String>,
    pub(crate) ledger: FailureLedger,
    backgrounded: bool,
    pressure_cutoff: Option<Priority>,
    max_concurrent: usize,
    retry: RetryPolicy,
    next_ticket: u64,
    next_seq: u64,
    total_retries: u64,
    peak_active: usize,
}

impl SchedulerState {
    pub(crate) fn new(
        max_concurrent: usize,
        queue_capacity: usize,
        retry: RetryPolicy,
        ledger: FailureLedger,
    ) -> Self {
        Self {
            active: HashMap::new(),
            pending: PendingQueue::new(queue_capacity),
            waiting: HashMap::new(),
            completed: HashSet::new(),
            retry_counts: HashMap::new(),
            non_retryable: HashSet::new(),
            ledger,
            backgrounded: false,
            pressure_cutoff: None,
            max_concurrent: max_concurrent.max(1),
            retry,
            next_ticket: 0,
            next_seq: 0,
            total_retries: 0,
            peak_active: 0,
        }
    }

    /// Record the memory situation that gates the next drains.
    pub(crate) fn observe_memory(&mut self, cutoff: Option<Priority>) {
        if cutoff != self.pressure_cutoff {
            match cutoff {
                Some(cutoff) => debug!(%cutoff, "memory pressure: holding queued low-value work"),
                None => debug!("memory pressure cleared"),
            }
            self.pressure_cutoff = cutoff;
        }
    }

    /// The no-op outcome for this submission, if it is one.
    pub(crate) fn precheck(&self, id: &str, identity: &str) -> Option<Submission> {
        if self.completed.contains(id) {
            return Some(Submission::AlreadyCompleted);
        }
        if self.active.contains_key(id) {
            return Some(Submission::AlreadyActive);
        }
        if self.pending.contains(id) || self.waiting.contains_key(id) {
            return Some(Submission::AlreadyQueued);
        }
        if self.ledger.is_suppressed(identity) {
            return Some(Submission::Suppressed);
        }
        if self.non_retryable.contains(id) {
            return Some(Submission::KnownUndecodable);
        }
        None
    }

    /// Accept a fresh submission. Caller must have run `precheck` under the same lock.
    pub(crate) fn accept(
        &mut self,
        request: LoadRequest,
        admission: &AdmissionController,
        usage: MemoryUsage,
    ) -> (LoadHandle, Effects) {
        // Reappearance is a fresh attempt, not a continuation.
        if self.retry_counts.remove(&request.id).is_some() {
            debug!(id = %request.id, "retry counter reset on resubmission");
        }
        let (tx, rx) = oneshot::channel();
        let handle = LoadHandle::new(request.id.clone(), rx);
        let decision = admission.decide(request.priority, self.active.len(), usage);
        let tracked = Tracked {
            request,
            responder: tx,
        };
        let effects = Effects {
            starts: self.place(tracked, decision),
            ..Effects::default()
        };
        (handle, effects)
    }

    /// Start or queue a tracked request according to `decision`.
    fn place(&mut self, mut tracked: Tracked, decision: Admission) -> Vec<StartPlan> {
        match decision {
            Admission::Admit if self.has_slot_for(tracked.request.priority) => {
                vec![self.activate(tracked)]
            }
            Admission::Downgrade => {
                debug!(
                    id = %tracked.request.id,
                    from = %tracked.request.priority,
                    "memory pressure: downgrading to low priority"
                );
                tracked.request.priority = Priority::Low;
                self.enqueue(tracked);
                Vec::new()
            }
            Admission::Admit | Admission::Defer => {
                self.enqueue(tracked);
                self.drain()
            }
        }
    }

    fn has_slot_for(&self, priority: Priority) -> bool {
        self.active.len() < self.max_concurrent
            && (!self.backgrounded || priority == Priority::Critical)
            && self.pressure_cutoff.map_or(true, |cutoff| priority >= cutoff)
    }

    fn enqueue(&mut self, tracked: Tracked) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = tracked.request.id.clone();
        let priority = tracked.request.priority;
        tracked.request.notify(LoadProgress::Queued);
        debug!(%id, %priority, queued = self.pending.len() + 1, "queued");
        for dropped in self.pending.push(id, priority, seq, tracked) {
            debug!(id = %dropped.request.id, "pending queue full; dropping tail entry");
            dropped.resolve(Err(LoadError::QueueOverflow));
        }
    }

    fn activate(&mut self, tracked: Tracked) -> StartPlan {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let attempt = self
            .retry_counts
            .get(&tracked.request.id)
            .copied()
            .unwrap_or(0)
            + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let job = LoadJob {
            ticket,
            attempt,
            request: tracked.request.clone(),
        };
        tracked.request.notify(LoadProgress::Started { attempt });
        debug!(id = %job.request.id, attempt, active = self.active.len() + 1, "starting load");
        self.active.insert(
            job.request.id.clone(),
            ActiveLoad {
                tracked,
                ticket,
                _cancel: cancel_tx,
            },
        );
        self.peak_active = self.peak_active.max(self.active.len());
        StartPlan {
            job,
            cancel: cancel_rx,
        }
    }

    /// Start queued requests while slots are free. Stops at the first entry
    /// that may not start, since everything behind it ranks no higher.
    pub(crate) fn drain(&mut self) -> Vec<StartPlan> {
        let mut plans = Vec::new();
        while let Some(priority) = self.pending.peek_priority() {
            if !self.has_slot_for(priority) {
                break;
            }
            let Some(tracked) = self.pending.pop_front() else {
                break;
            };
            if self.ledger.is_suppressed(&tracked.request.identity) {
                tracked.resolve(Err(LoadError::Suppressed));
                continue;
            }
            plans.push(self.activate(tracked));
        }
        plans
    }

    /// Apply the result of a load attempt. `None` if the load was cancelled
    /// (or superseded) while it ran; its result is discarded.
    pub(crate) fn finish(&mut self, job: &LoadJob, attempt: Attempt) -> Option<Effects> {
        let id = job.request.id.as_str();
        match self.active.get(id) {
            Some(active) if active.ticket == job.ticket => {}
            _ => return None,
        }
        let ActiveLoad { tracked, .. } = self.active.remove(id)?;
        let identity = tracked.request.identity.clone();
        let mut effects = Effects {
            persist: true,
            ..Effects::default()
        };

        match attempt {
            Attempt::CacheHit(artifact) => {
                debug!(id, "served from artifact cache");
                self.complete(tracked, artifact);
            }
            Attempt::Fetched(artifact) => {
                self.ledger.record_success(&identity);
                info!(id, bytes = artifact.len(), format = %artifact.format, "load completed");
                self.complete(tracked, artifact);
            }
            Attempt::Failed(FetchFailure::Decode(reason)) => {
                self.ledger.record_failure(&identity);
                self.retry_counts.remove(id);
                self.non_retryable.insert(id.to_string());
                warn!(id, %reason, "payload is not a valid artifact; not retrying");
                tracked.resolve(Err(LoadError::Undecodable(reason)));
            }
            Attempt::Failed(failure) => {
                let newly_suppressed = self.ledger.record_failure(&identity);
                let failures = {
                    let count = self.retry_counts.entry(id.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };
                if self.ledger.is_suppressed(&identity) {
                    tracked.resolve(Err(LoadError::Suppressed));
                    if newly_suppressed {
                        self.purge_identity(&identity);
                    }
                } else {
                    match self.retry.decide(failures) {
                        RetryDecision::RetryAfter(delay) => {
                            debug!(id, failures, ?delay, %failure, "scheduling retry");
                            effects.retry = Some(self.wait_for_retry(tracked, failures, delay));
                        }
                        RetryDecision::GiveUp => {
                            warn!(id, failures, %failure, "retries exhausted; abandoning");
                            tracked.resolve(Err(LoadError::RetriesExhausted {
                                attempts: failures,
                                last: failure,
                            }));
                        }
                    }
                }
            }
        }

        effects.starts = self.drain();
        Some(effects)
    }

    fn complete(&mut self, tracked: Tracked, artifact: Artifact) {
        let id = tracked.request.id.clone();
        self.retry_counts.remove(&id);
        self.completed.insert(id);
        tracked.resolve(Ok(artifact));
    }

    fn wait_for_retry(&mut self, tracked: Tracked, failures: u32, delay: Duration) -> RetryPlan {
        self.total_retries += 1;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let id = tracked.request.id.clone();
        tracked.request.notify(LoadProgress::RetryScheduled {
            attempt: failures,
            delay,
        });
        self.waiting.insert(
            id.clone(),
            RetryWait {
                tracked,
                ticket,
                _cancel: cancel_tx,
            },
        );
        RetryPlan {
            id,
            ticket,
            delay,
            cancel: cancel_rx,
        }
    }

    /// Re-submit a request whose retry delay elapsed. The retry counter is kept.
    pub(crate) fn resume(
        &mut self,
        id: &str,
        ticket: u64,
        admission: &AdmissionController,
        usage: MemoryUsage,
    ) -> Effects {
        match self.waiting.get(id) {
            Some(wait) if wait.ticket == ticket => {}
            _ => return Effects::default(),
        }
        let Some(RetryWait { tracked, .. }) = self.waiting.remove(id) else {
            return Effects::default();
        };
        if self.ledger.is_suppressed(&tracked.request.identity) {
            tracked.resolve(Err(LoadError::Suppressed));
            return Effects::default();
        }
        let decision = admission.decide(tracked.request.priority, self.active.len(), usage);
        Effects {
            starts: self.place(tracked, decision),
            ..Effects::default()
        }
    }

    /// Resolve queued and waiting requests for a newly suppressed identity.
    fn purge_identity(&mut self, identity: &str) {
        let mut purged = self
            .pending
            .extract_if(|t| t.request.identity == identity);
        let waiting: Vec<String> = self
            .waiting
            .iter()
            .filter(|(_, w)| w.tracked.request.identity == identity)
            .map(|(id, _)| id.clone())
            .collect();
        for id in waiting {
            if let Some(wait) = self.waiting.remove(&id) {
                purged.push(wait.tracked);
            }
        }
        for tracked in purged {
            debug!(id = %tracked.request.id, identity, "dropping request for suppressed identity");
            tracked.resolve(Err(LoadError::Suppressed));
        }
    }

    /// Run the ledger sweep and purge anything it suppressed.
    pub(crate) fn sweep_ledger(&mut self, now: u64) -> (Vec<String>, Effects) {
        let promoted = self.ledger.sweep_at(now);
        for identity in &promoted {
            self.purge_identity(identity);
        }
        let effects = Effects {
            persist: !promoted.is_empty(),
            ..Effects::default()
        };
        (promoted, effects)
    }

    /// Cancel one request wherever it is. Returns whether anything was cancelled.
    pub(crate) fn cancel(&mut self, id: &str) -> (bool, Effects) {
        let tracked = if let Some(active) = self.active.remove(id) {
            Some(active.tracked)
        } else if let Some(tracked) = self.pending.remove(id) {
            Some(tracked)
        } else {
            self.waiting.remove(id).map(|w| w.tracked)
        };
        let Some(tracked) = tracked else {
            return (false, Effects::default());
        };
        debug!(id, "cancelled");
        tracked.resolve(Err(LoadError::Cancelled));
        let effects = Effects {
            starts: self.drain(),
            ..Effects::default()
        };
        (true, effects)
    }

    /// Cancel every request whose (current) priority is at or below `max`.
    pub(crate) fn cancel_at_or_below(&mut self, max: Priority) -> (usize, Effects) {
        let mut cancelled: Vec<Tracked> = Vec::new();

        let active: Vec<String> = self
            .active
            .iter()
            .filter(|(_, a)| a.tracked.request.priority <= max)
            .map(|(id, _)| id.clone())
            .collect();
        for id in active {
            if let Some(a) = self.active.remove(&id) {
                cancelled.push(a.tracked);
            }
        }
        cancelled.extend(self.pending.extract_if(|t| t.request.priority <= max));
        let waiting: Vec<String> = self
            .waiting
            .iter()
            .filter(|(_, w)| w.tracked.request.priority <= max)
            .map(|(id, _)| id.clone())
            .collect();
        for id in waiting {
            if let Some(w) = self.waiting.remove(&id) {
                cancelled.push(w.tracked);
            }
        }

        let count = cancelled.len();
        for tracked in cancelled {
            tracked.resolve(Err(LoadError::Cancelled));
        }
        if count > 0 {
            debug!(count, %max, "cancelled requests at or below priority");
        }
        let effects = Effects {
            starts: self.drain(),
            ..Effects::default()
        };
        (count, effects)
    }

    pub(crate) fn admit_deferred(&mut self) -> Effects {
        Effects {
            starts: self.drain(),
            ..Effects::default()
        }
    }

    /// Forget terminal bookkeeping for `id` so it can be submitted again.
    pub(crate) fn clear_terminal(&mut self, id: &str) {
        self.completed.remove(id);
        self.non_retryable.remove(id);
        self.retry_counts.remove(id);
    }

    pub(crate) fn clear_completed(&mut self) -> usize {
        let n = self.completed.len();
        self.completed.clear();
        n
    }

    pub(crate) fn set_backgrounded(&mut self, backgrounded: bool) -> Effects {
        self.backgrounded = backgrounded;
        Effects {
            starts: if backgrounded { Vec::new() } else { self.drain() },
            ..Effects::default()
        }
    }

    pub(crate) fn retry_count(&self, id: &str) -> u32 {
        self.retry_counts.get(id).copied().unwrap_or(0)
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            active: self.active.len(),
            pending: self.pending.len(),
            completed: self.completed.len(),
            total_retries: self.total_retries,
            retry_waiting: self.waiting.len(),
            suppressed_identities: self.ledger.suppressed_count(),
            peak_active: self.peak_active,
            backgrounded: self.backgrounded,
        }
    }

    /// Ids currently queued, in the order they would start.
    pub(crate) fn pending_ids(&self) -> Vec<String> {
        self.pending.iter().map(|t| t.request.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::admission::StaticMemoryProbe;
    use crate::artifact::{fixtures, ArtifactDecoder, ImageDecoder};
    use crate::config::AdmissionConfig;
    use crate::ledger::SuppressionRule;

    fn setup() -> (SchedulerState, AdmissionController) {
        let admission = AdmissionController::new(
            &AdmissionConfig::default(),
            2,
            Arc::new(StaticMemoryProbe::default()),
        );
        let state = SchedulerState::new(
            2,
            10,
            RetryPolicy::default(),
            FailureLedger::new(SuppressionRule::default()),
        );
        (state, admission)
    }

    fn start(
        state: &mut SchedulerState,
        admission: &AdmissionController,
        id: &str,
    ) -> (LoadHandle, LoadJob) {
        let url = Url::parse(&format!("https://img.test/{id}")).unwrap();
        let (handle, mut effects) =
            state.accept(LoadRequest::new(id, url), admission, MemoryUsage::default());
        let plan = effects.starts.pop().unwrap();
        (handle, plan.job)
    }

    fn artifact() -> Artifact {
        ImageDecoder.decode(&fixtures::png(b"late")).unwrap()
    }

    #[tokio::test]
    async fn result_after_cancel_is_discarded() {
        let (mut state, admission) = setup();
        let (handle, job) = start(&mut state, &admission, "a");

        let (cancelled, _) = state.cancel("a");
        assert!(cancelled);
        assert!(state.finish(&job, Attempt::Fetched(artifact())).is_none());

        assert_eq!(handle.outcome().await.unwrap_err(), LoadError::Cancelled);
        let stats = state.stats();
        assert_eq!((stats.active, stats.completed), (0, 0));
        assert!(state.precheck("a", "a").is_none());
    }

    #[tokio::test]
    async fn superseded_attempt_leaves_the_new_submission_alone() {
        let (mut state, admission) = setup();
        let (first, stale) = start(&mut state, &admission, "a");
        state.cancel("a");
        let (second, current) = start(&mut state, &admission, "a");

        let failure = Attempt::Failed(FetchFailure::Transport("reset".into()));
        assert!(state.finish(&stale, failure).is_none());
        assert_eq!(state.stats().active, 1);
        assert_eq!(state.retry_count("a"), 0);
        assert_eq!(first.outcome().await.unwrap_err(), LoadError::Cancelled);

        assert!(state.finish(&current, Attempt::Fetched(artifact())).is_some());
        assert!(second.outcome().await.is_ok());
        assert_eq!(state.stats().completed, 1);
    }

    #[test]
    fn pressure_holds_queued_entries_below_the_cutoff() {
        let (mut state, admission) = setup();
        state.observe_memory(Some(Priority::High));
        let url = Url::parse("https://img.test/thumb").unwrap();
        let (_handle, effects) = state.accept(
            LoadRequest::new("thumb", url),
            &admission,
            MemoryUsage::default(),
        );
        assert!(effects.starts.is_empty());
        assert!(state.drain().is_empty());

        state.observe_memory(None);
        assert_eq!(state.drain().len(), 1);
    }
}
