//! Load requests as submitted by callers.
//!
//! A request names *what* to load (a locator), *which* underlying resource it
//! is (the identity used for cache and failure keys) and *how urgently*
//! (priority). The scheduler owns the request after submission; callers keep
//! a [`LoadHandle`] that resolves exactly once.

mod handle;
mod priority;
mod progress;

use tokio::sync::mpsc;
use url::Url;

pub use handle::{LoadHandle, LoadOutcome, Submission};
pub use priority::Priority;
pub use progress::LoadProgress;

/// Caller-assigned request identifier. Idempotence and dedup are keyed on it.
pub type RequestId = String;

/// A request to load one artifact.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub id: RequestId,
    pub locator: Url,
    /// Stable key of the underlying resource. Defaults to the locator.
    pub identity: String,
    /// Base context the artifact is cached under (e.g. a size bucket or account).
    pub context: String,
    pub priority: Priority,
    progress: Option<mpsc::Sender<LoadProgress>>,
}

impl LoadRequest {
    pub fn new(id: impl Into<RequestId>, locator: Url) -> Self {
        let identity = locator.as_str().to_string();
        Self {
            id: id.into(),
            locator,
            identity,
            context: String::new(),
            priority: Priority::Normal,
            progress: None,
        }
    }

    /// Parse `locator` and build a request whose id and identity are the locator itself.
    pub fn from_locator(locator: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(locator)?;
        let id = url.as_str().to_string();
        Ok(Self::new(id, url))
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Receive [`LoadProgress`] events for this request. Events are dropped
    /// when the channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<LoadProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub(crate) fn notify(&self, event: LoadProgress) {
        if let Some(tx) = &self.progress {
            let _ = tx.try_send(event);
        }
    }
}
