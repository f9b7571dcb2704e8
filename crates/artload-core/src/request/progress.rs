//! Progress events for a single load request.
//!
//! Sent on the request's optional progress channel; consumers can use them to
//! drive placeholders or spinners without polling scheduler statistics.

use std::time::Duration;

/// Lifecycle event for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProgress {
    /// Waiting in the pending queue for a free slot.
    Queued,
    /// A slot was granted; `attempt` is 1 for the first try.
    Started { attempt: u32 },
    /// Served from the artifact cache without a network fetch.
    CacheHit,
    /// Payload received from the fetcher (before decoding).
    Fetched { bytes: usize },
    /// A retryable failure occurred; the next attempt starts after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
}
