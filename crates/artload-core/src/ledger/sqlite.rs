//! SQLite-backed ledger store (sqlx).
//!
//! The ledger is kept as a tiny key-value table with one row per persisted
//! collection (`suppressed`, `records`), each value a JSON document.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

use super::persist::LedgerStore;
use super::state::{PersistedLedger, PersistedRecord};
use super::unix_timestamp;

const KEY_SUPPRESSED: &str = "suppressed";
const KEY_RECORDS: &str = "records";

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}?mode=rwc", out)
}

#[derive(Clone)]
pub struct SqliteLedgerStore {
    pool: Pool<Sqlite>,
}

impl SqliteLedgerStore {
    /// Open (or create) `~/.local/state/artload/ledger.db`.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("artload")?;
        let db_path = xdg_dirs.get_state_home().join("ledger.db");
        Self::open_at(&db_path).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&path_to_sqlite_uri(path))
            .await
            .with_context(|| format!("open ledger db: {}", path.display()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load(&self) -> Result<Option<PersistedLedger>> {
        let rows = sqlx::query(r#"SELECT key, value FROM ledger_state"#)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut snapshot = PersistedLedger {
            version: 1,
            ..PersistedLedger::default()
        };
        for row in rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                KEY_SUPPRESSED => {
                    snapshot.suppressed = serde_json::from_str::<Vec<String>>(&value)
                        .context("parse suppressed identities")?;
                }
                KEY_RECORDS => {
                    snapshot.records = serde_json::from_str::<Vec<PersistedRecord>>(&value)
                        .context("parse failure records")?;
                }
                other => tracing::debug!(key = other, "ignoring unknown ledger_state row"),
            }
        }
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &PersistedLedger) -> Result<()> {
        let now = unix_timestamp() as i64;
        let suppressed = serde_json::to_string(&snapshot.suppressed)?;
        let records = serde_json::to_string(&snapshot.records)?;

        let mut tx = self.pool.begin().await?;
        for (key, value) in [(KEY_SUPPRESSED, suppressed), (KEY_RECORDS, records)] {
            sqlx::query(
                r#"
                INSERT INTO ledger_state (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
impl SqliteLedgerStore {
    /// Run a raw statement against the store (used to simulate corruption).
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}
