use std::sync::Arc;

use tokio::sync::Mutex;

use crate::admission::{AdmissionController, MemoryProbe, SystemMemoryProbe};
use crate::artifact::{ArtifactDecoder, ImageDecoder};
use crate::cache::ArtifactCache;
use crate::config::{AdmissionConfig, ArtloadConfig, SchedulerConfig};
use crate::fetch::ResourceFetcher;
use crate::ledger::{FailureLedger, LedgerStore, SuppressionRule};
use crate::retry::RetryPolicy;

use super::service::{LoadScheduler, Shared};
use super::state::SchedulerState;

/// Configures and builds a [`LoadScheduler`].
///
/// Fetcher and cache are required; everything else defaults to the
/// production implementation with `ArtloadConfig::default()` settings.
pub struct SchedulerBuilder {
    fetcher: Arc<dyn ResourceFetcher>,
    cache: Arc<dyn ArtifactCache>,
    decoder: Arc<dyn ArtifactDecoder>,
    probe: Option<Arc<dyn MemoryProbe>>,
    scheduler: SchedulerConfig,
    admission: AdmissionConfig,
    retry: RetryPolicy,
    rule: SuppressionRule,
    ledger: Option<FailureLedger>,
    ledger_store: Option<Arc<dyn LedgerStore>>,
}

impl LoadScheduler {
    pub fn builder(
        fetcher: Arc<dyn ResourceFetcher>,
        cache: Arc<dyn ArtifactCache>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            fetcher,
            cache,
            decoder: Arc::new(ImageDecoder),
            probe: None,
            scheduler: SchedulerConfig::default(),
            admission: AdmissionConfig::default(),
            retry: RetryPolicy::default(),
            rule: SuppressionRule::default(),
            ledger: None,
            ledger_store: None,
        }
    }
}

impl SchedulerBuilder {
    /// Take scheduler, admission, retry and ledger-rule settings from `cfg`.
    pub fn config(mut self, cfg: &ArtloadConfig) -> Self {
        self.scheduler = cfg.scheduler.clone();
        self.admission = cfg.admission.clone();
        self.retry = RetryPolicy::from_config(&cfg.retry);
        self.rule = SuppressionRule::from_config(&cfg.ledger);
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.scheduler.max_concurrent = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.scheduler.queue_capacity = n;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn admission(mut self, cfg: AdmissionConfig) -> Self {
        self.admission = cfg;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ArtifactDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Start from an existing ledger instead of an empty (or stored) one.
    pub fn ledger(mut self, ledger: FailureLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Persist the ledger to `store` after every change.
    pub fn ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.ledger_store = Some(store);
        self
    }

    /// Build without touching the ledger store; the ledger starts empty unless
    /// one was supplied.
    pub fn build(mut self) -> LoadScheduler {
        let rule = self.rule;
        let ledger = self
            .ledger
            .take()
            .unwrap_or_else(|| FailureLedger::new(rule));
        self.assemble(ledger)
    }

    /// Build, loading the ledger from the configured store and running the
    /// startup sweep.
    pub async fn open(mut self) -> LoadScheduler {
        let ledger = match (self.ledger.take(), &self.ledger_store) {
            (Some(ledger), _) => ledger,
            (None, Some(store)) => FailureLedger::load(store.as_ref(), self.rule).await,
            (None, None) => FailureLedger::new(self.rule),
        };
        let scheduler = self.assemble(ledger);
        scheduler.sweep_ledger().await;
        scheduler
    }

    fn assemble(self, ledger: FailureLedger) -> LoadScheduler {
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SystemMemoryProbe::default()) as Arc<dyn MemoryProbe>);
        let max_concurrent = self.scheduler.max_concurrent.max(1);
        let admission = AdmissionController::new(&self.admission, max_concurrent, probe);
        let state = SchedulerState::new(
            max_concurrent,
            self.scheduler.queue_capacity,
            self.retry,
            ledger,
        );
        tracing::debug!(
            max_concurrent,
            queue_capacity = self.scheduler.queue_capacity,
            max_retries = self.retry.max_retries,
            "load scheduler ready"
        );
        LoadScheduler {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                admission,
                fetcher: self.fetcher,
                cache: self.cache,
                decoder: self.decoder,
                ledger_store: self.ledger_store,
                persist_lock: Mutex::new(()),
            }),
        }
    }
}
