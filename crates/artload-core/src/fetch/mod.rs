//! Resource fetching.
//!
//! The scheduler only needs "GET this locator, give me a status and bytes".
//! [`ResourceFetcher`] is that seam; [`CurlFetcher`] is the libcurl-backed
//! implementation used by the CLI.

mod http;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub use http::CurlFetcher;

/// Raw response of a single GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Network-level failure: nothing usable came back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Performs the network retrieval for a locator.
///
/// Implementations must be cancel-safe: the scheduler drops the returned
/// future when a request is cancelled mid-flight.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, locator: &Url) -> Result<FetchResponse, TransportError>;
}
