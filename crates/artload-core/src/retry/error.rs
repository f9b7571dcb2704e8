//! Failure taxonomy for a single attempt and for a whole request.

use thiserror::Error;

/// Why one fetch attempt did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Network-level failure (connect, DNS, timeout, reset).
    #[error("transport: {0}")]
    Transport(String),
    /// Response status outside 2xx.
    #[error("HTTP {0}")]
    BadStatus(u16),
    /// 2xx response with no body.
    #[error("empty payload")]
    EmptyPayload,
    /// Payload arrived but is not the expected artifact type.
    #[error("decode: {0}")]
    Decode(String),
}

impl FetchFailure {
    /// Whether trying again could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchFailure::Decode(_))
    }
}

/// Terminal failure surfaced to callers through their [`LoadHandle`](crate::request::LoadHandle).
///
/// Raw transport errors never reach callers directly; they are folded into
/// `RetriesExhausted` once the retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("gave up after {attempts} failed attempts (last: {last})")]
    RetriesExhausted { attempts: u32, last: FetchFailure },
    #[error("resource is not a valid artifact: {0}")]
    Undecodable(String),
    #[error("resource is permanently suppressed")]
    Suppressed,
    #[error("load cancelled")]
    Cancelled,
    #[error("dropped from a full pending queue")]
    QueueOverflow,
}
