use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::admission::{AdmissionController, MemoryUsage};
use crate::artifact::ArtifactDecoder;
use crate::cache::ArtifactCache;
use crate::fetch::ResourceFetcher;
use crate::ledger::{self, LedgerStore};
use crate::request::{LoadRequest, Priority, Submission};

use super::state::{Attempt, Effects, LoadJob, SchedulerState};
use super::stats::SchedulerStats;
use super::task;

/// State and collaborators shared between the scheduler handle and its tasks.
pub(crate) struct Shared {
    pub(super) state: Mutex<SchedulerState>,
    pub(super) admission: AdmissionController,
    pub(super) fetcher: Arc<dyn ResourceFetcher>,
    pub(super) cache: Arc<dyn ArtifactCache>,
    pub(super) decoder: Arc<dyn ArtifactDecoder>,
    pub(super) ledger_store: Option<Arc<dyn LedgerStore>>,
    /// Serialises ledger saves so an older snapshot never overwrites a newer one.
    pub(super) persist_lock: Mutex<()>,
}

impl Shared {
    /// Sample memory, then lock the state with that sample applied to its drains.
    async fn lock_sampled(&self) -> (MutexGuard<'_, SchedulerState>, MemoryUsage) {
        let usage = self.admission.sample();
        let mut state = self.state.lock().await;
        state.observe_memory(self.admission.pressure_cutoff(usage));
        (state, usage)
    }

    /// Spawn started loads and retry timers; persist the ledger if asked.
    async fn apply(self: &Arc<Self>, effects: Effects) {
        let Effects {
            starts,
            retry,
            persist,
        } = effects;
        for plan in starts {
            tokio::spawn(task::run_load(Arc::clone(self), plan));
        }
        if let Some(plan) = retry {
            tokio::spawn(task::wait_then_resume(Arc::clone(self), plan));
        }
        if persist {
            self.persist_ledger().await;
        }
    }

    pub(super) async fn finish(self: &Arc<Self>, job: LoadJob, attempt: Attempt) {
        let effects = {
            let (mut state, _) = self.lock_sampled().await;
            state.finish(&job, attempt)
        };
        match effects {
            Some(effects) => self.apply(effects).await,
            None => tracing::debug!(id = %job.request.id, "discarding result of superseded load"),
        }
    }

    pub(super) async fn resume(self: &Arc<Self>, id: &str, ticket: u64) {
        let effects = {
            let (mut state, usage) = self.lock_sampled().await;
            state.resume(id, ticket, &self.admission, usage)
        };
        self.apply(effects).await;
    }

    /// Save the ledger if it changed. A failed save leaves it dirty for the next attempt.
    async fn persist_ledger(&self) {
        let Some(store) = &self.ledger_store else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.ledger.take_dirty() {
                return;
            }
            state.ledger.to_snapshot()
        };
        if let Err(e) = store.save(&snapshot).await {
            tracing::warn!("failed to persist failure ledger: {e:#}");
            self.state.lock().await.ledger.mark_dirty();
        }
    }
}

/// Priority-ordered, concurrency-bounded loader.
///
/// Cloning is cheap; all clones drive the same scheduler. Loads run on the
/// ambient tokio runtime.
#[derive(Clone)]
pub struct LoadScheduler {
    pub(super) shared: Arc<Shared>,
}

impl std::fmt::Debug for LoadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadScheduler")
            .field("admission", &self.shared.admission)
            .finish_non_exhaustive()
    }
}

impl LoadScheduler {
    /// Submit a request. Returns `Accepted` with a handle for new work, or a
    /// no-op variant explaining why nothing was scheduled.
    pub async fn submit(&self, request: LoadRequest) -> Submission {
        let (handle, effects) = {
            let (mut state, usage) = self.shared.lock_sampled().await;
            if let Some(skip) = state.precheck(&request.id, &request.identity) {
                tracing::debug!(id = %request.id, outcome = ?skip, "submission skipped");
                return skip;
            }
            state.accept(request, &self.shared.admission, usage)
        };
        self.shared.apply(effects).await;
        Submission::Accepted(handle)
    }

    /// Cancel a request wherever it is. In-flight work is abandoned and its
    /// result discarded. Returns false if the id was not known.
    pub async fn cancel(&self, id: &str) -> bool {
        let (cancelled, effects) = {
            let (mut state, _) = self.shared.lock_sampled().await;
            state.cancel(id)
        };
        self.shared.apply(effects).await;
        cancelled
    }

    /// Cancel every request at or below `priority`. Returns how many were cancelled.
    pub async fn cancel_all(&self, priority: Priority) -> usize {
        let (count, effects) = {
            let (mut state, _) = self.shared.lock_sampled().await;
            state.cancel_at_or_below(priority)
        };
        self.shared.apply(effects).await;
        count
    }

    /// Forget completion, retry and undecodable history for `id` so a later
    /// `submit` loads it again. Suppression is not affected.
    pub async fn retry(&self, id: &str) {
        self.shared.state.lock().await.clear_terminal(id);
    }

    /// Forget all completed ids. Returns how many were cleared.
    pub async fn clear_completed(&self) -> usize {
        self.shared.state.lock().await.clear_completed()
    }

    /// While backgrounded only critical requests may start; the rest wait in
    /// the queue and start once foregrounded.
    pub async fn set_backgrounded(&self, backgrounded: bool) {
        let effects = {
            let (mut state, _) = self.shared.lock_sampled().await;
            state.set_backgrounded(backgrounded)
        };
        tracing::debug!(backgrounded, "scheduler background state changed");
        self.shared.apply(effects).await;
    }

    /// Take a fresh memory sample and start queued work it now allows, such
    /// as requests held back while memory was tight. Returns how many started.
    pub async fn admit_deferred(&self) -> usize {
        let effects = {
            let (mut state, _) = self.shared.lock_sampled().await;
            state.admit_deferred()
        };
        let started = effects.starts.len();
        if started > 0 {
            tracing::debug!(started, "started deferred requests");
        }
        self.shared.apply(effects).await;
        started
    }

    /// Promote eligible ledger records to suppression and drop any queued
    /// work for them. Returns the newly suppressed identities.
    pub async fn sweep_ledger(&self) -> Vec<String> {
        let (promoted, effects) = self
            .shared
            .state
            .lock()
            .await
            .sweep_ledger(ledger::unix_timestamp());
        if !promoted.is_empty() {
            tracing::info!(count = promoted.len(), "ledger sweep suppressed identities");
        }
        self.shared.apply(effects).await;
        promoted
    }

    /// Run [`sweep_ledger`](Self::sweep_ledger) and
    /// [`admit_deferred`](Self::admit_deferred) every `period` until the task
    /// is aborted.
    pub fn spawn_periodic_sweep(&self, period: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; startup already swept.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                scheduler.sweep_ledger().await;
                scheduler.admit_deferred().await;
            }
        })
    }

    /// Whether `identity` is permanently suppressed.
    pub async fn is_suppressed(&self, identity: &str) -> bool {
        self.shared.state.lock().await.ledger.is_suppressed(identity)
    }

    /// Retryable failures recorded for `id` in its current submission.
    pub async fn retry_count(&self, id: &str) -> u32 {
        self.shared.state.lock().await.retry_count(id)
    }

    /// Ids waiting in the queue, in start order.
    pub async fn pending_ids(&self) -> Vec<String> {
        self.shared.state.lock().await.pending_ids()
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.shared.state.lock().await.stats()
    }

    /// Current memory reading from the admission probe.
    pub fn memory_usage(&self) -> MemoryUsage {
        self.shared.admission.sample()
    }

    /// Save the ledger now if it has unsaved changes.
    pub async fn flush_ledger(&self) {
        self.shared.persist_ledger().await;
    }
}
