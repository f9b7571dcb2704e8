use tokio::sync::oneshot;

use crate::artifact::Artifact;
use crate::retry::LoadError;

use super::RequestId;

/// Terminal result of a load: the artifact, or why it will not arrive.
pub type LoadOutcome = Result<Artifact, LoadError>;

/// Result of [`LoadScheduler::submit`](crate::scheduler::LoadScheduler::submit).
///
/// Only `Accepted` creates new work. Every other variant is a no-op and
/// leaves scheduler state untouched.
#[derive(Debug)]
pub enum Submission {
    Accepted(LoadHandle),
    /// The id is currently fetching.
    AlreadyActive,
    /// The id is waiting in the queue or for a retry delay.
    AlreadyQueued,
    /// The id already finished successfully; call `retry` to load it again.
    AlreadyCompleted,
    /// The resource identity is permanently suppressed.
    Suppressed,
    /// A previous attempt for this id returned a payload that does not decode.
    KnownUndecodable,
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }

    pub fn into_handle(self) -> Option<LoadHandle> {
        match self {
            Submission::Accepted(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Caller side of an accepted request. Resolves exactly once, on whichever
/// task awaits it.
#[derive(Debug)]
pub struct LoadHandle {
    id: RequestId,
    rx: oneshot::Receiver<LoadOutcome>,
}

impl LoadHandle {
    pub(crate) fn new(id: RequestId, rx: oneshot::Receiver<LoadOutcome>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the terminal outcome. A request dropped by the scheduler
    /// without an explicit outcome (e.g. the scheduler itself was dropped)
    /// reports `Cancelled`.
    pub async fn outcome(self) -> LoadOutcome {
        self.rx.await.unwrap_or(Err(LoadError::Cancelled))
    }

    /// Non-blocking check; `None` while the request is still in flight.
    pub fn try_outcome(&mut self) -> Option<LoadOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(LoadError::Cancelled)),
        }
    }
}
