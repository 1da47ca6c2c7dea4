//! Job definition, priority and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Job priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// Low priority.
    Low = 0,
    /// Normal priority.
    Normal = 1,
    /// High priority.
    High = 2,
    /// Urgent priority.
    Urgent = 3,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl JobPriority {
    /// Numeric form used by the persistence layer.
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Inverse of [`JobPriority::as_i64`]. Unknown values fall back to `Normal`.
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => JobPriority::Low,
            2 => JobPriority::High,
            3 => JobPriority::Urgent,
            _ => JobPriority::Normal,
        }
    }
}

/// Job lifecycle status.
///
/// Transitions are monotonic forward only: `pending → running → {completed |
/// failed}`, plus `pending → cancelled` and the automatic `failed → pending`
/// requeue while attempts remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in queue.
    Pending,
    /// Currently being executed by a worker.
    Running,
    /// Completed successfully.
    Completed,
    /// Failed after exhausting its attempts.
    Failed,
    /// Cancelled before execution started.
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

impl JobStatus {
    /// Stable string form used by the persistence layer.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`JobStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID, assigned at creation.
    pub id: Uuid,
    /// Handler routing key (e.g. `notification`, `sleep`, `research`).
    pub job_type: String,
    /// Handler-defined payload, opaque to the queue.
    pub payload: Value,
    /// Dequeue priority.
    pub priority: JobPriority,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Execution attempts so far.
    pub attempts: u32,
    /// Maximum execution attempts before the job is marked failed.
    pub max_attempts: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the first/latest execution attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last error message; populated only when `status == Failed`.
    pub error: Option<String>,
    /// Handler result; populated only when `status == Completed`.
    pub result: Option<Value>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            priority: JobPriority::Normal,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    /// Set job priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set maximum execution attempts.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Whether another automatic attempt is allowed after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Partial update applied to a stored job.
///
/// The store applies whatever the patch carries; state-machine legality is the
/// caller's responsibility (the store stays a thin persistence layer).
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub attempts: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    /// Reset `started_at` to unset; the next attempt stamps it afresh.
    pub clear_started_at: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
}

impl JobPatch {
    /// Patch for the pending → running transition.
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    /// Patch for a successful completion.
    pub fn completed(result: Value) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            completed_at: Some(Utc::now()),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Patch for terminal failure with the most recent error.
    pub fn failed(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            attempts: Some(attempts),
            completed_at: Some(Utc::now()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Patch for the automatic failed-attempt requeue (same id). The stale
    /// `started_at` is cleared, matching the crash-recovery reset.
    pub fn requeued(attempts: u32) -> Self {
        Self {
            status: Some(JobStatus::Pending),
            attempts: Some(attempts),
            clear_started_at: true,
            ..Default::default()
        }
    }

    /// Patch for cancellation of a pending job.
    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Apply this patch to a job document.
    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(attempts) = self.attempts {
            job.attempts = attempts;
        }
        if self.clear_started_at {
            job.started_at = None;
        }
        if let Some(started_at) = self.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            job.completed_at = Some(completed_at);
        }
        if let Some(ref error) = self.error {
            job.error = Some(error.clone());
        }
        if let Some(ref result) = self.result {
            job.result = Some(result.clone());
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
