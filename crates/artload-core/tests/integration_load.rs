//! Integration test: local HTTP server, curl fetcher, disk cache and the scheduler.
//!
//! Serves a valid image, a missing path and an HTML error page, and checks
//! that each ends the way callers expect and that cached artifacts survive a
//! fresh scheduler without touching the network.

mod common;

use std::sync::Arc;
use std::time::Duration;

use artload_core::cache::DiskArtifactCache;
use artload_core::fetch::CurlFetcher;
use artload_core::ledger::{JsonLedgerStore, LedgerStore};
use artload_core::retry::{FetchFailure, LoadError, RetryPolicy};
use artload_core::{LoadRequest, LoadScheduler, Submission};
use common::image_server::{self, Route};
use tempfile::tempdir;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nintegration";

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn loads_over_http_and_serves_repeats_from_disk() {
    let server = image_server::start([
        ("hero.png", Route::ok(PNG)),
        ("error.html", Route::ok(&b"<html>oops</html>"[..])),
        ("flaky.png", Route::status(503)),
    ]);
    let cache_dir = tempdir().unwrap();
    let state_dir = tempdir().unwrap();
    let store: Arc<dyn LedgerStore> =
        Arc::new(JsonLedgerStore::new(state_dir.path().join("ledger.json")));

    let scheduler = LoadScheduler::builder(
        Arc::new(CurlFetcher::default()),
        Arc::new(DiskArtifactCache::open(cache_dir.path()).await.unwrap()),
    )
    .retry_policy(fast_retries())
    .ledger_store(store.clone())
    .open()
    .await;

    let hero = LoadRequest::from_locator(&server.url("hero.png")).unwrap();
    let artifact = scheduler
        .submit(hero.clone())
        .await
        .into_handle()
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(artifact.data.as_ref(), PNG);
    assert_eq!(server.hits("hero.png"), 1);

    let page = LoadRequest::from_locator(&server.url("error.html")).unwrap();
    let err = scheduler
        .submit(page.clone())
        .await
        .into_handle()
        .unwrap()
        .outcome()
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Undecodable(_)));
    assert!(matches!(
        scheduler.submit(page).await,
        Submission::KnownUndecodable
    ));

    let flaky = LoadRequest::from_locator(&server.url("flaky.png")).unwrap();
    let err = scheduler
        .submit(flaky)
        .await
        .into_handle()
        .unwrap()
        .outcome()
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoadError::RetriesExhausted {
            attempts: 2,
            last: FetchFailure::BadStatus(503),
        }
    );
    assert_eq!(server.hits("flaky.png"), 2);

    // A fresh scheduler over the same cache directory does not refetch.
    let again = LoadScheduler::builder(
        Arc::new(CurlFetcher::default()),
        Arc::new(DiskArtifactCache::open(cache_dir.path()).await.unwrap()),
    )
    .build();
    let cached = again
        .submit(hero)
        .await
        .into_handle()
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert_eq!(cached, artifact);
    assert_eq!(server.hits("hero.png"), 1);

    // Every failure landed in the persisted ledger.
    scheduler.flush_ledger().await;
    let snapshot = store.load().await.unwrap().unwrap();
    let failures: u32 = snapshot.records.iter().map(|r| r.failure_count).sum();
    assert_eq!(failures, 3);
}

#[tokio::test]
async fn unreachable_host_is_a_transport_failure() {
    // Bind then drop a listener so the port is (almost certainly) closed.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let scheduler = LoadScheduler::builder(
        Arc::new(CurlFetcher::default()),
        Arc::new(artload_core::cache::MemoryArtifactCache::new()),
    )
    .retry_policy(RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(1),
    })
    .build();

    let req = LoadRequest::from_locator(&format!("http://127.0.0.1:{port}/x.png")).unwrap();
    let err = scheduler
        .submit(req)
        .await
        .into_handle()
        .unwrap()
        .outcome()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::RetriesExhausted {
            attempts: 1,
            last: FetchFailure::Transport(_),
        }
    ));
}
