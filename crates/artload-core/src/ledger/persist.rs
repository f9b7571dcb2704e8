//! Ledger persistence: the store seam, the JSON file backend, and loading
//! with empty-ledger fallback.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::record::SuppressionRule;
use super::state::{FailureLedger, PersistedLedger};

/// Durable home of a [`PersistedLedger`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<PersistedLedger>>;
    async fn save(&self, snapshot: &PersistedLedger) -> Result<()>;
}

impl FailureLedger {
    /// Load from `store`. Missing, unreadable or malformed state yields an
    /// empty ledger; this never fails.
    pub async fn load(store: &dyn LedgerStore, rule: SuppressionRule) -> FailureLedger {
        match store.load().await {
            Ok(Some(snapshot)) => {
                let ledger = FailureLedger::from_snapshot(snapshot, rule);
                tracing::debug!(
                    suppressed = ledger.suppressed_count(),
                    outstanding = ledger.outstanding_count(),
                    "loaded failure ledger"
                );
                ledger
            }
            Ok(None) => FailureLedger::new(rule),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failure ledger unreadable; starting empty");
                FailureLedger::new(rule)
            }
        }
    }
}

/// JSON file under the XDG state dir.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default path: `~/.local/state/artload/failure_ledger.json`.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("artload")?;
        Ok(xdg_dirs.get_state_home().join("failure_ledger.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonLedgerStore {
    async fn load(&self) -> Result<Option<PersistedLedger>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("read failure ledger: {}", self.path.display()))
            }
        };
        let snapshot: PersistedLedger = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse failure ledger: {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &PersistedLedger) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(snapshot).context("serialize failure ledger")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("write failure ledger: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace failure ledger: {}", self.path.display()))?;
        Ok(())
    }
}
