//! Retry and backoff policy.
//!
//! This module encapsulates failure classification (transport errors, bad
//! status, empty or undecodable payloads) and backoff decisions so that the
//! scheduler applies one consistent policy to every request.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_http_status};
pub use error::{FetchFailure, LoadError};
pub use policy::{RetryDecision, RetryPolicy};
