//! Five-field cron expression matching.
//!
//! Matching is a pure function over a wall-clock instant, kept separate from
//! the ticking loop so schedule evaluation is testable without sleeping.

use chrono::{DateTime, Timelike, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;

use crate::error::SchedulerError;

/// A parsed five-field cron expression (minute, hour, day-of-month, month,
/// day-of-week).
#[derive(Debug, Clone)]
pub struct CronExpr {
    expr: String,
    schedule: CronSchedule,
}

impl CronExpr {
    /// Parse a five-field cron expression.
    ///
    /// The underlying parser speaks the six-field form with a leading seconds
    /// field, so the expression is normalized by pinning seconds to `0`.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let fields = expr.split_whitespace().count();
        if fields != 5 {
            return Err(SchedulerError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("expected 5 fields, got {}", fields),
            });
        }

        let normalized = format!("0 {}", expr.trim());
        let schedule =
            CronSchedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    /// The original expression string.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Whether the minute containing `at` matches the expression. Resolution
    /// is one minute; seconds within the minute are irrelevant.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        match truncate_to_minute(at) {
            Some(minute) => self.schedule.includes(minute),
            None => false,
        }
    }

    /// The next matching instant strictly after `at`.
    pub fn next_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&at).next()
    }
}

/// Truncate an instant to the start of its minute.
pub fn truncate_to_minute(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.with_second(0)?.with_nanosecond(0)
}

/// Whether two instants fall within the same wall-clock minute.
pub fn same_minute(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    truncate_to_minute(a) == truncate_to_minute(b)
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
