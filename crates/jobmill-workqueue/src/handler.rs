//! Handler registry: maps job types to executable handlers.
//!
//! The registry is owned by the embedding application and resolved once at
//! startup; workers only look handlers up by the job's type string.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;

/// Execution context passed to a handler alongside the payload.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Id of the job being executed.
    pub job_id: Uuid,
    /// Which execution attempt this is (1-based).
    pub attempt: u32,
    /// Advisory cancellation flag. Cancelling a running job only trips this
    /// token; a handler that ignores it still records its real outcome.
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Whether cancellation has been requested for this job.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Job handler trait.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute a job. The returned value is recorded as the job result.
    async fn execute(&self, payload: &Value, ctx: &JobContext) -> Result<Value, QueueError>;
}

/// String-keyed registry of job handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        debug!("Registered handler for job type '{}'", job_type);
        self.handlers.insert(job_type, handler);
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Whether a handler exists for the job type.
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types.
    pub fn job_types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}
