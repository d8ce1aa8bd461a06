use std::fmt;
use thiserror::Error;

use super::reference::ReferenceError;
use super::signing::SigningError;

/// Signing keys could not be obtained. Retried on the next call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key fetch failed: {0}")]
    FetchFailed(String),
    #[error("malformed key material: {0}")]
    Malformed(String),
}

/// One strategy attempt (or the video lookup preceding it) failed.
///
/// Absorbed by the engine, which moves on to the next strategy.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("platform rejected request (code {code}): {message}")]
    Api { code: i64, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("page {page} not found ({available} available)")]
    PageNotFound { page: u32, available: usize },
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AttemptError::Timeout
        } else if e.is_decode() {
            AttemptError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            AttemptError::Status(status.as_u16())
        } else {
            AttemptError::Transport(e.to_string())
        }
    }
}

/// Where a failed resolution gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Reference,
    PrimaryApi,
    Fallback,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Reference => f.write_str("reference parsing"),
            FailureStage::PrimaryApi => f.write_str("primary API"),
            FailureStage::Fallback => f.write_str("fallback extractor"),
        }
    }
}

/// Errors surfaced to callers of the engine
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("signing keys unavailable: {0}")]
    KeyFetchFailed(#[from] KeyError),

    #[error("all {attempted} request strategies exhausted without a usable link")]
    AllStrategiesExhausted { attempted: usize },

    #[error("resolution failed at {stage}: {reason}")]
    ResolutionFailed { stage: FailureStage, reason: String },
}

impl ResolveError {
    pub(crate) fn failed(stage: FailureStage, reason: impl Into<String>) -> Self {
        ResolveError::ResolutionFailed {
            stage,
            reason: reason.into(),
        }
    }
}

impl From<ReferenceError> for ResolveError {
    fn from(e: ReferenceError) -> Self {
        ResolveError::failed(FailureStage::Reference, e.to_string())
    }
}
