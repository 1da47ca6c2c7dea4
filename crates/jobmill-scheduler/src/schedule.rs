//! Recurring schedule definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A recurring rule that periodically produces new jobs.
///
/// A schedule never mutates after creation except for `enabled`,
/// `last_fired_at` and `run_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique schedule identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Five-field cron expression (minute, hour, day-of-month, month,
    /// day-of-week).
    pub cron_expression: String,
    /// Job type enqueued when the schedule fires.
    pub job_type: String,
    /// Payload given to every job this schedule produces.
    pub payload_template: Value,
    /// Whether the schedule is evaluated on ticks.
    pub enabled: bool,
    /// Wall-clock time of the most recent fire.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Number of jobs produced so far.
    pub run_count: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Create a new enabled schedule. The cron expression is validated by the
    /// scheduler, not here.
    pub fn new(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        job_type: impl Into<String>,
        payload_template: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cron_expression: cron_expression.into(),
            job_type: job_type.into(),
            payload_template,
            enabled: true,
            last_fired_at: None,
            run_count: 0,
            created_at: Utc::now(),
        }
    }
}
