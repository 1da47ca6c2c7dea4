//! # jobmill scheduler
//!
//! Cron-style recurring schedules that feed the jobmill work queue.
//!
//! Schedules are declarative: a five-field cron expression plus a job type
//! and payload template. A fixed-interval tick evaluates every enabled
//! schedule against the wall clock and enqueues a job for each matching
//! minute, at most once per minute per schedule.

pub mod config;
pub mod cron;
pub mod error;
pub mod schedule;
pub mod scheduler;
pub mod store;

pub use config::SchedulerConfig;
pub use cron::CronExpr;
pub use error::SchedulerError;
pub use schedule::Schedule;
pub use scheduler::{Scheduler, SchedulerStats};
pub use store::{MemoryScheduleStore, ScheduleStore, SqliteScheduleStore};
