//! Worker error types.

use thiserror::Error;

use adreel_engine::{EngineError, ExternalError};
use adreel_store::StoreError;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur while driving a render job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Renderer error: {0}")]
    Renderer(#[from] ExternalError),
}
