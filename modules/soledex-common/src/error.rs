use std::time::Duration;

use thiserror::Error;

/// Coarse classification driving the coordinator's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff up to the configured attempts, then skip the
    /// query for this source.
    Transient,
    /// Mark the source exhausted for the rest of the run.
    Fatal,
    /// Skip this single item/response, log, continue.
    Malformed,
}

/// Typed failure surface of a source adapter. Adapters signal these
/// instead of raising on every branch; the coordinator decides what to
/// do based on `class()`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("no results")]
    NotFound,

    #[error("auth rejected: {0}")]
    Auth(String),
}

impl SourceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SourceError::Timeout | SourceError::RateLimited { .. } => ErrorClass::Transient,
            SourceError::Auth(_) => ErrorClass::Fatal,
            SourceError::BadResponse(_) | SourceError::NotFound => ErrorClass::Malformed,
        }
    }
}
