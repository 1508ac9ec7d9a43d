//! Engine error taxonomy.

use std::time::Duration;

use thiserror::Error;

use adreel_models::ValidationError;
use adreel_store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of an external collaborator (content generator, renderer).
#[derive(Debug, Clone, Error)]
#[error("{service}: {message}")]
pub struct ExternalError {
    /// Which collaborator failed
    pub service: &'static str,
    pub message: String,
    /// Whether a retry may help (network blips, throttling)
    pub retryable: bool,
    /// Explicit backoff hint, if the service supplied one
    pub retry_after_ms: Option<u64>,
}

impl ExternalError {
    pub fn retryable(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
            retryable: true,
            retry_after_ms: None,
        }
    }

    pub fn fatal(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
            retryable: false,
            retry_after_ms: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing fields; never retried automatically.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Illegal state transition (e.g. cancelling a terminal render job).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// External collaborator still failing after bounded retry.
    #[error("External service error: {0}")]
    External(#[from] ExternalError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => EngineError::NotFound(msg),
            StoreError::RevisionConflict(msg) | StoreError::AlreadyExists(msg) => {
                EngineError::Conflict(msg)
            }
            StoreError::IntegrityViolation(msg) => EngineError::Internal(msg),
            StoreError::Serialization(e) => EngineError::Internal(e.to_string()),
        }
    }
}
