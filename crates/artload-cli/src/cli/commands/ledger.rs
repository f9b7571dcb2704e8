//! `artload ledger status|sweep` – inspect and maintain the failure ledger.

use anyhow::Result;
use artload_core::config::ArtloadConfig;
use artload_core::ledger::{self, FailureLedger, SuppressionRule};

pub async fn run_ledger_status(cfg: &ArtloadConfig) -> Result<()> {
    let store = ledger::open_store(&cfg.ledger).await?;
    let ledger = FailureLedger::load(store.as_ref(), SuppressionRule::from_config(&cfg.ledger)).await;

    let mut suppressed: Vec<&str> = ledger.suppressed().collect();
    suppressed.sort_unstable();
    if suppressed.is_empty() {
        println!("No suppressed identities.");
    } else {
        println!("Suppressed ({}):", suppressed.len());
        for identity in suppressed {
            println!("  {identity}");
        }
    }

    let mut records: Vec<_> = ledger.records().collect();
    records.sort_by(|a, b| b.failure_count.cmp(&a.failure_count).then(a.identity.cmp(&b.identity)));
    if records.is_empty() {
        println!("No outstanding failures.");
    } else {
        let rule = ledger.rule();
        println!("{:<9} {:<12} {}", "FAILURES", "FIRST SEEN", "IDENTITY");
        for r in records {
            println!(
                "{:<9} {:<12} {}",
                format!("{}/{}", r.failure_count, rule.min_failures),
                r.first_failure_at,
                r.identity
            );
        }
    }
    Ok(())
}

pub async fn run_ledger_sweep(cfg: &ArtloadConfig) -> Result<()> {
    let store = ledger::open_store(&cfg.ledger).await?;
    let mut ledger =
        FailureLedger::load(store.as_ref(), SuppressionRule::from_config(&cfg.ledger)).await;
    let promoted = ledger.sweep();
    if promoted.is_empty() {
        println!("Nothing to suppress.");
        return Ok(());
    }
    store.save(&ledger.to_snapshot()).await?;
    for identity in &promoted {
        println!("suppressed {identity}");
    }
    tracing::info!(count = promoted.len(), "ledger sweep complete");
    Ok(())
}
