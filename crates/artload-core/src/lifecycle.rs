//! Process lifecycle reactions.
//!
//! Hosts forward coarse process events to a [`LifecycleCoordinator`], which
//! sheds or resumes scheduler work. These are best-effort policies: they
//! never affect correctness, only how much work is in flight.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::LifecycleConfig;
use crate::request::Priority;
use crate::scheduler::LoadScheduler;

/// Process-level event delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The host reports memory pressure.
    MemoryWarning,
    /// The app left the foreground.
    Backgrounded,
    /// The app returned to the foreground.
    Foregrounded,
}

/// What one signal did to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reaction {
    pub cancelled: usize,
    pub cleared_completed: usize,
}

#[derive(Debug, Clone)]
pub struct LifecycleCoordinator {
    scheduler: LoadScheduler,
    memory_warning_bytes: u64,
}

impl LifecycleCoordinator {
    pub fn new(scheduler: LoadScheduler, cfg: &LifecycleConfig) -> Self {
        Self {
            scheduler,
            memory_warning_bytes: cfg.memory_warning_bytes,
        }
    }

    pub async fn handle(&self, signal: LifecycleSignal) -> Reaction {
        let reaction = match signal {
            LifecycleSignal::MemoryWarning => {
                let resident = self.scheduler.memory_usage().resident_bytes;
                if resident <= self.memory_warning_bytes {
                    tracing::debug!(resident, "memory warning below threshold; ignoring");
                    return Reaction::default();
                }
                // Retry counters are kept; only "already done" bookkeeping is dropped.
                Reaction {
                    cancelled: self.scheduler.cancel_all(Priority::Normal).await,
                    cleared_completed: self.scheduler.clear_completed().await,
                }
            }
            LifecycleSignal::Backgrounded => {
                self.scheduler.set_backgrounded(true).await;
                Reaction {
                    cancelled: self.scheduler.cancel_all(Priority::High).await,
                    ..Reaction::default()
                }
            }
            LifecycleSignal::Foregrounded => {
                self.scheduler.set_backgrounded(false).await;
                Reaction::default()
            }
        };
        tracing::info!(
            ?signal,
            cancelled = reaction.cancelled,
            cleared_completed = reaction.cleared_completed,
            "lifecycle signal handled"
        );
        reaction
    }

    /// Handle signals from `rx` until the sender side closes.
    pub fn spawn(self, mut rx: mpsc::Receiver<LifecycleSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                self.handle(signal).await;
            }
            tracing::debug!("lifecycle channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use url::Url;

    use super::*;
    use crate::admission::StaticMemoryProbe;
    use crate::artifact::fixtures;
    use crate::cache::MemoryArtifactCache;
    use crate::fetch::{FetchResponse, ResourceFetcher, TransportError};
    use crate::request::{LoadRequest, Submission};
    use crate::retry::LoadError;

    const GIB: u64 = 1 << 30;

    /// Blocks every fetch until permits are added.
    struct GatedFetcher(Arc<Semaphore>);

    #[async_trait]
    impl ResourceFetcher for GatedFetcher {
        async fn fetch(&self, locator: &Url) -> Result<FetchResponse, TransportError> {
            self.0.acquire().await.unwrap().forget();
            Ok(FetchResponse::ok(fixtures::png(locator.path().as_bytes())))
        }
    }

    fn setup(resident: u64) -> (LifecycleCoordinator, LoadScheduler, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let scheduler = LoadScheduler::builder(
            Arc::new(GatedFetcher(gate.clone())),
            Arc::new(MemoryArtifactCache::new()),
        )
        .max_concurrent(2)
        .memory_probe(Arc::new(StaticMemoryProbe::new(resident, 64 * GIB)))
        .build();
        let coordinator = LifecycleCoordinator::new(scheduler.clone(), &LifecycleConfig::default());
        (coordinator, scheduler, gate)
    }

    fn req(name: &str, priority: Priority) -> LoadRequest {
        let url = Url::parse(&format!("https://img.test/{name}")).unwrap();
        LoadRequest::new(name, url).with_priority(priority)
    }

    #[tokio::test]
    async fn memory_warning_below_threshold_changes_nothing() {
        let (coordinator, scheduler, _gate) = setup(GIB / 2);
        scheduler.submit(req("a", Priority::Low)).await;

        let reaction = coordinator.handle(LifecycleSignal::MemoryWarning).await;
        assert_eq!(reaction, Reaction::default());
        assert_eq!(scheduler.stats().await.active, 1);
    }

    #[tokio::test]
    async fn memory_warning_sheds_normal_and_below() {
        let (coordinator, scheduler, gate) = setup(2 * GIB);
        let done = scheduler
            .submit(req("done", Priority::Critical))
            .await
            .into_handle()
            .unwrap();
        gate.add_permits(1);
        assert!(done.outcome().await.is_ok());

        let high = scheduler
            .submit(req("high", Priority::High))
            .await
            .into_handle()
            .unwrap();
        let normal = scheduler
            .submit(req("normal", Priority::Normal))
            .await
            .into_handle()
            .unwrap();
        scheduler.submit(req("low", Priority::Low)).await;

        let reaction = coordinator.handle(LifecycleSignal::MemoryWarning).await;
        assert_eq!(
            reaction,
            Reaction {
                cancelled: 2,
                cleared_completed: 1
            }
        );
        assert_eq!(normal.outcome().await.unwrap_err(), LoadError::Cancelled);
        // Completed bookkeeping was cleared, so "done" may load again.
        assert!(scheduler.submit(req("done", Priority::Critical)).await.is_accepted());

        gate.add_permits(2);
        assert!(high.outcome().await.is_ok());
    }

    #[tokio::test]
    async fn background_keeps_only_critical_work_until_foregrounded() {
        let (coordinator, scheduler, gate) = setup(0);
        let critical = scheduler
            .submit(req("critical", Priority::Critical))
            .await
            .into_handle()
            .unwrap();
        let high = scheduler
            .submit(req("high", Priority::High))
            .await
            .into_handle()
            .unwrap();

        let reaction = coordinator.handle(LifecycleSignal::Backgrounded).await;
        assert_eq!(reaction.cancelled, 1);
        assert_eq!(high.outcome().await.unwrap_err(), LoadError::Cancelled);

        // New non-critical work waits while backgrounded.
        let later = scheduler
            .submit(req("later", Priority::Normal))
            .await
            .into_handle()
            .unwrap();
        let stats = scheduler.stats().await;
        assert_eq!((stats.active, stats.pending), (1, 1));

        coordinator.handle(LifecycleSignal::Foregrounded).await;
        gate.add_permits(2);
        assert!(critical.outcome().await.is_ok());
        assert!(later.outcome().await.is_ok());
    }

    #[tokio::test]
    async fn spawned_loop_handles_signals_until_closed() {
        let (coordinator, scheduler, _gate) = setup(0);
        let (tx, rx) = mpsc::channel(4);
        let task = coordinator.spawn(rx);

        tx.send(LifecycleSignal::Backgrounded).await.unwrap();
        drop(tx);
        task.await.unwrap();
        assert!(scheduler.stats().await.backgrounded);
        assert!(matches!(
            scheduler.submit(req("x", Priority::Low)).await,
            Submission::Accepted(_)
        ));
        assert_eq!(scheduler.stats().await.pending, 1);
    }
}
