//! Queue errors.

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// A job with this id already exists.
    #[error("Duplicate job id: {0}")]
    DuplicateId(Uuid),

    /// Operation violates the job state machine.
    #[error("Invalid state for {operation}: job {id} is {status:?}")]
    InvalidState {
        id: Uuid,
        status: JobStatus,
        operation: &'static str,
    },

    /// No handler registered for the job type. Configuration bug, not a
    /// transient fault: the job fails immediately without retries.
    #[error("No handler registered for job type '{0}'")]
    HandlerNotFound(String),

    /// Handler returned an error during execution.
    #[error("Handler execution failed: {0}")]
    Execution(String),

    /// Persistence medium error.
    #[error("Store error: {0}")]
    Store(String),
}

impl QueueError {
    /// Store-layer error from any displayable source.
    pub fn store(err: impl std::fmt::Display) -> Self {
        QueueError::Store(err.to_string())
    }
}
