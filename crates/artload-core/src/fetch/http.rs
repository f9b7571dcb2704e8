//! GET via the curl crate (libcurl) on a blocking thread.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::FetchConfig;

use super::{FetchResponse, ResourceFetcher, TransportError};

/// Sets the shared abort flag when dropped, so a cancelled fetch future stops
/// the transfer running on the blocking pool.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Fetches locators with libcurl. Follows redirects.
#[derive(Debug, Clone)]
pub struct CurlFetcher {
    connect_timeout: Duration,
    timeout: Duration,
}

impl Default for CurlFetcher {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl CurlFetcher {
    pub fn from_config(cfg: &FetchConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
        }
    }
}

#[async_trait]
impl ResourceFetcher for CurlFetcher {
    async fn fetch(&self, locator: &Url) -> Result<FetchResponse, TransportError> {
        let url = locator.to_string();
        let abort = AbortOnDrop(Arc::new(AtomicBool::new(false)));
        let token = Arc::clone(&abort.0);
        let (connect_timeout, timeout) = (self.connect_timeout, self.timeout);

        let joined =
            tokio::task::spawn_blocking(move || get(&url, connect_timeout, timeout, &token)).await;
        drop(abort);
        joined.map_err(|e| TransportError::new(format!("fetch task failed: {e}")))?
    }
}

/// Blocking GET. Returns any HTTP status; status policy is the caller's concern.
fn get(
    url: &str,
    connect_timeout: Duration,
    timeout: Duration,
    abort: &AtomicBool,
) -> Result<FetchResponse, TransportError> {
    let mut body = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.get(true)?;
    easy.follow_location(true)?;
    easy.connect_timeout(connect_timeout)?;
    easy.timeout(timeout)?;
    easy.progress(true)?;

    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        // Returning false aborts the transfer with a callback error.
        transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    let status = u16::try_from(status)
        .map_err(|_| TransportError::new(format!("invalid HTTP status {status}")))?;
    tracing::debug!(url, status, bytes = body.len(), "fetch finished");
    Ok(FetchResponse { status, body })
}
