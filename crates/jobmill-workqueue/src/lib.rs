//! # jobmill workqueue
//!
//! Durable background job queue for long-lived, possibly-failing units of
//! work.
//!
//! ## Features
//!
//! - Priority queue (`urgent > high > normal > low`, FIFO within a band)
//! - Bounded worker pool with concurrent execution
//! - Job state persistence (SQLite) with crash recovery
//! - Automatic retry with exponential back-off, explicit retry as a new job
//! - Advisory cancellation of running jobs

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod queue;
pub mod store;
pub mod worker;

pub use config::QueueConfig;
pub use error::QueueError;
pub use handler::{HandlerRegistry, JobContext, JobHandler};
pub use job::{Job, JobPatch, JobPriority, JobStatus};
pub use queue::{CancelOutcome, EnqueueOptions, JobQueue, QueueStats, WorkerCounts};
pub use store::{JobFilter, JobStore, MemoryJobStore, SqliteJobStore, StatusCounts};
pub use worker::{Worker, WorkerPool};
