//! Classify fetcher responses into payloads or [`FetchFailure`]s.

use crate::fetch::{FetchResponse, TransportError};

use super::error::FetchFailure;

/// Classify an HTTP status code; `None` means success.
pub fn classify_http_status(code: u16) -> Option<FetchFailure> {
    match code {
        200..=299 => None,
        _ => Some(FetchFailure::BadStatus(code)),
    }
}

/// Turn a raw fetch result into the payload bytes or a failure.
pub fn classify(result: Result<FetchResponse, TransportError>) -> Result<Vec<u8>, FetchFailure> {
    let response = result.map_err(|e| FetchFailure::Transport(e.to_string()))?;
    if let Some(failure) = classify_http_status(response.status) {
        return Err(failure);
    }
    if response.body.is_empty() {
        return Err(FetchFailure::EmptyPayload);
    }
    Ok(response.body)
}
