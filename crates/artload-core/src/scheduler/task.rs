//! Spawned work: one load attempt, and the timer that re-submits after a retry delay.
//!
//! Both return boxed futures so that spawning from inside the scheduler
//! (which these tasks themselves call back into) has a nameable type.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::LoadProgress;
use crate::retry::{self, FetchFailure};

use super::service::Shared;
use super::state::{Attempt, LoadJob, RetryPlan, StartPlan};

pub(super) type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Run one attempt unless the scheduler cancels it first.
pub(super) fn run_load(shared: Arc<Shared>, plan: StartPlan) -> BoxedTask {
    Box::pin(async move {
        let StartPlan { job, cancel } = plan;
        let attempt = tokio::select! {
            _ = cancel => {
                tracing::debug!(id = %job.request.id, attempt = job.attempt, "load task cancelled");
                return;
            }
            attempt = attempt_load(&shared, &job) => attempt,
        };
        shared.finish(job, attempt).await;
    })
}

/// Cache lookup, then fetch, classify and decode. A decoded artifact is
/// written to the cache before the attempt is reported.
async fn attempt_load(shared: &Shared, job: &LoadJob) -> Attempt {
    let req = &job.request;
    if let Some(artifact) = shared.cache.get(&req.identity, &req.context).await {
        req.notify(LoadProgress::CacheHit);
        return Attempt::CacheHit(artifact);
    }

    let bytes = match retry::classify(shared.fetcher.fetch(&req.locator).await) {
        Ok(bytes) => bytes,
        Err(failure) => {
            tracing::debug!(id = %req.id, attempt = job.attempt, %failure, "fetch attempt failed");
            return Attempt::Failed(failure);
        }
    };
    req.notify(LoadProgress::Fetched { bytes: bytes.len() });

    match shared.decoder.decode(&bytes) {
        Ok(artifact) => {
            shared.cache.put(&artifact, &req.identity, &req.context).await;
            Attempt::Fetched(artifact)
        }
        Err(e) => Attempt::Failed(FetchFailure::Decode(e.0)),
    }
}

/// Sleep out a retry delay, then hand the request back to the scheduler.
pub(super) fn wait_then_resume(shared: Arc<Shared>, plan: RetryPlan) -> BoxedTask {
    Box::pin(async move {
        let RetryPlan {
            id,
            ticket,
            delay,
            cancel,
        } = plan;
        tokio::select! {
            _ = cancel => return,
            _ = tokio::time::sleep(delay) => {}
        }
        shared.resume(&id, ticket).await;
    })
}
