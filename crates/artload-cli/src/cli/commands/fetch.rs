//! `artload fetch` – load URLs through the scheduler and report each outcome.

use anyhow::{bail, Context, Result};
use artload_core::cache::DiskArtifactCache;
use artload_core::config::ArtloadConfig;
use artload_core::fetch::CurlFetcher;
use artload_core::ledger;
use artload_core::request::{LoadRequest, Priority, Submission};
use artload_core::LoadScheduler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct FetchArgs {
    pub urls: Vec<String>,
    pub priority: Priority,
    pub from_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

pub async fn run_fetch(cfg: &ArtloadConfig, args: FetchArgs) -> Result<()> {
    let mut locators = args.urls;
    if let Some(path) = &args.from_file {
        locators.extend(read_url_file(path)?);
    }
    if locators.is_empty() {
        bail!("no URLs given (pass them as arguments or with --from-file)");
    }

    let cache_dir = match args.cache_dir {
        Some(dir) => dir,
        None => DiskArtifactCache::default_dir()?,
    };
    let cache = DiskArtifactCache::open(&cache_dir).await?;
    let store = ledger::open_store(&cfg.ledger).await?;
    let scheduler = LoadScheduler::builder(
        Arc::new(CurlFetcher::from_config(&cfg.fetch)),
        Arc::new(cache),
    )
    .config(cfg)
    .ledger_store(store)
    .open()
    .await;
    // Picks up work deferred under memory pressure once it eases.
    let ticker = scheduler.spawn_periodic_sweep(Duration::from_secs(1));

    let mut handles = Vec::new();
    for locator in &locators {
        let request = LoadRequest::from_locator(locator)
            .with_context(|| format!("invalid URL: {locator}"))?
            .with_priority(args.priority);
        match scheduler.submit(request).await {
            Submission::Accepted(handle) => handles.push(handle),
            other => println!("{:<10} {}", skip_label(&other), locator),
        }
    }

    let mut failed = 0usize;
    for handle in handles {
        let id = handle.id().to_string();
        match handle.outcome().await {
            Ok(artifact) => println!(
                "{:<10} {} ({}, {} bytes)",
                "ok", id, artifact.format, artifact.len()
            ),
            Err(e) => {
                failed += 1;
                println!("{:<10} {}: {}", "failed", id, e);
            }
        }
    }

    ticker.abort();
    scheduler.flush_ledger().await;
    let stats = scheduler.stats().await;
    tracing::info!(
        completed = stats.completed,
        retries = stats.total_retries,
        suppressed = stats.suppressed_identities,
        "fetch finished"
    );

    if failed > 0 {
        bail!("{} of {} request(s) failed", failed, locators.len());
    }
    Ok(())
}

fn skip_label(submission: &Submission) -> &'static str {
    match submission {
        Submission::Accepted(_) => "accepted",
        Submission::AlreadyActive | Submission::AlreadyQueued => "duplicate",
        Submission::AlreadyCompleted => "done",
        Submission::Suppressed => "suppressed",
        Submission::KnownUndecodable => "invalid",
    }
}

fn read_url_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read URL list: {}", path.display()))?;
    Ok(parse_url_list(&text))
}

/// One URL per line; blank lines and `#` comments are skipped.
pub(crate) fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_skips_blanks_and_comments() {
        let text = "# thumbnails\nhttps://a.test/1.png\n\n   https://a.test/2.png  \n#https://a.test/3.png\n";
        assert_eq!(
            parse_url_list(text),
            vec!["https://a.test/1.png", "https://a.test/2.png"]
        );
    }

    #[test]
    fn skip_labels_are_distinct_for_terminal_reasons() {
        assert_eq!(skip_label(&Submission::Suppressed), "suppressed");
        assert_eq!(skip_label(&Submission::KnownUndecodable), "invalid");
        assert_eq!(skip_label(&Submission::AlreadyQueued), "duplicate");
    }
}
