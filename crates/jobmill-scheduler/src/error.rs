//! Scheduler error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors for schedule management and evaluation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Schedule not found: {0}")]
    NotFound(Uuid),

    #[error("Schedule id already exists: {0}")]
    DuplicateId(Uuid),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Queue(#[from] jobmill_workqueue::QueueError),
}

impl SchedulerError {
    /// Wrap a persistence-layer failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}
