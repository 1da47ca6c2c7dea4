//! Priority queue over pending jobs.
//!
//! The heap holds `{id, priority, created_at}` entries only; the store stays
//! the single source of truth and the heap can always be rebuilt from it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::handler::JobContext;
use crate::job::{Job, JobPatch, JobPriority, JobStatus};
use crate::store::{JobFilter, JobStore, StatusCounts};

/// Heap entry referencing a pending job by id.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    id: Uuid,
    priority: JobPriority,
    created_at: DateTime<Utc>,
}

impl QueueEntry {
    fn for_job(job: &Job) -> Self {
        Self {
            id: job.id,
            priority: job.priority,
            created_at: job.created_at,
        }
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier creation time, then smaller id
        // for a deterministic total order.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Options for [`JobQueue::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Dequeue priority, `Normal` by default.
    pub priority: JobPriority,
    /// Maximum execution attempts; `None` keeps the job default.
    pub max_attempts: Option<u32>,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub success: bool,
    pub reason: Option<String>,
}

impl CancelOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    fn ok_with(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            reason: Some(reason.into()),
        }
    }
}

/// Queue statistics for the collaborator-facing surface.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueStats {
    #[serde(flatten)]
    pub jobs: StatusCounts,
    pub workers: WorkerCounts,
}

/// Worker slot counts, filled in by the worker pool.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct WorkerCounts {
    pub total: u32,
    pub busy: u32,
}

/// Priority-ordered in-memory view over pending jobs in the store.
pub struct JobQueue {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    heap: RwLock<BinaryHeap<QueueEntry>>,
    wake: Notify,
    /// Advisory cancellation flags for currently running jobs.
    running: DashMap<Uuid, CancellationToken>,
}

impl JobQueue {
    /// Create a queue over a store.
    pub fn new(config: QueueConfig, store: Arc<dyn JobStore>) -> Self {
        Self {
            config,
            store,
            heap: RwLock::new(BinaryHeap::new()),
            wake: Notify::new(),
            running: DashMap::new(),
        }
    }

    /// Queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Recover interrupted jobs and rebuild the heap from the store.
    ///
    /// Jobs left `Running` by an abnormal shutdown become `Pending` again
    /// (at-least-once re-dispatch), then every pending job is re-indexed.
    pub async fn load_from_store(&self) -> Result<(), QueueError> {
        let recovered = self.store.recover_interrupted().await?;
        if recovered > 0 {
            info!("Reset {} interrupted jobs to pending", recovered);
        }

        let pending = self
            .store
            .list(JobFilter::by_status(JobStatus::Pending))
            .await?;
        let mut heap = self.heap.write().await;
        heap.clear();
        for job in &pending {
            heap.push(QueueEntry::for_job(job));
        }
        info!("Loaded {} pending jobs from store", heap.len());
        Ok(())
    }

    /// Enqueue a new job. The job is persisted as `pending` before the heap
    /// is touched, so a failed write never advances in-memory state.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: Value,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let mut job = Job::new(job_type, payload).with_priority(opts.priority);
        if let Some(max) = opts.max_attempts {
            job = job.with_max_attempts(max);
        }
        let id = self.submit(job).await?;
        Ok(id)
    }

    /// Persist a fully built job and index it.
    async fn submit(&self, job: Job) -> Result<Uuid, QueueError> {
        self.store.insert(&job).await?;

        let mut heap = self.heap.write().await;
        debug!(
            "Enqueued job {} (type: {}, priority: {:?})",
            job.id, job.job_type, job.priority
        );
        heap.push(QueueEntry::for_job(&job));
        drop(heap);

        self.wake.notify_one();
        Ok(job.id)
    }

    /// Pop the highest-priority pending job and atomically claim it.
    ///
    /// The pending → running store transition is the point of exclusivity:
    /// entries whose job was claimed or cancelled in the meantime fail the
    /// compare-and-set and are simply dropped from the index.
    pub async fn dequeue_next(&self) -> Result<Option<Job>, QueueError> {
        loop {
            let entry = {
                let mut heap = self.heap.write().await;
                heap.pop()
            };
            let Some(entry) = entry else {
                return Ok(None);
            };

            let claim = self
                .store
                .transition(entry.id, JobStatus::Pending, JobPatch::running(Utc::now()))
                .await;

            match claim {
                Ok(Some(job)) => {
                    debug!("Dequeued job {} (attempt {})", job.id, job.attempts + 1);
                    return Ok(Some(job));
                }
                // Claimed by another worker or cancelled meanwhile; skip.
                Ok(None) | Err(QueueError::NotFound(_)) => continue,
                Err(e) => {
                    // Persistence failure: put the entry back so the index
                    // does not silently diverge from the store.
                    self.heap.write().await.push(entry);
                    return Err(e);
                }
            }
        }
    }

    /// Wait until new work may be available.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    /// Number of indexed pending jobs.
    pub async fn len(&self) -> usize {
        self.heap.read().await.len()
    }

    /// Whether the pending index is empty.
    pub async fn is_empty(&self) -> bool {
        self.heap.read().await.is_empty()
    }

    /// Look up a job by id.
    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        self.store.get(id).await
    }

    /// List jobs matching a filter.
    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        self.store.list(filter).await
    }

    /// Job counts per status.
    pub async fn job_counts(&self) -> Result<StatusCounts, QueueError> {
        self.store.counts().await
    }

    /// Cancel a job.
    ///
    /// Pending jobs are marked cancelled and never reach a worker. Cancelling
    /// a running job is advisory only: the handler's cancellation token is
    /// tripped but the job records its real outcome. Terminal jobs reject the
    /// call with an invalid-state error.
    pub async fn cancel_job(&self, id: Uuid) -> Result<CancelOutcome, QueueError> {
        let job = self.store.get(id).await?.ok_or(QueueError::NotFound(id))?;

        match job.status {
            JobStatus::Completed | JobStatus::Failed => Err(QueueError::InvalidState {
                id,
                status: job.status,
                operation: "cancel",
            }),
            JobStatus::Cancelled => Ok(CancelOutcome::ok_with("job already cancelled")),
            JobStatus::Pending => {
                let cancelled = self
                    .store
                    .transition(id, JobStatus::Pending, JobPatch::cancelled())
                    .await?;
                match cancelled {
                    Some(_) => {
                        // The stale heap entry fails its claim CAS later.
                        debug!("Cancelled pending job {}", id);
                        Ok(CancelOutcome::ok())
                    }
                    // Started running between the read and the CAS.
                    None => Ok(self.request_running_cancellation(id)),
                }
            }
            JobStatus::Running => Ok(self.request_running_cancellation(id)),
        }
    }

    fn request_running_cancellation(&self, id: Uuid) -> CancelOutcome {
        if let Some(token) = self.running.get(&id) {
            token.cancel();
        }
        debug!("Requested advisory cancellation for running job {}", id);
        CancelOutcome::ok_with("job is running; cancellation is advisory")
    }

    /// Retry a failed job by minting a new job id with the same type and
    /// payload. The original record keeps its failure history.
    pub async fn retry_job(&self, id: Uuid) -> Result<Uuid, QueueError> {
        let job = self.store.get(id).await?.ok_or(QueueError::NotFound(id))?;
        if job.status != JobStatus::Failed {
            return Err(QueueError::InvalidState {
                id,
                status: job.status,
                operation: "retry",
            });
        }

        let retry = Job::new(job.job_type.clone(), job.payload.clone())
            .with_priority(job.priority)
            .with_max_attempts(job.max_attempts);
        let new_id = self.submit(retry).await?;
        info!("Retrying failed job {} as new job {}", id, new_id);
        Ok(new_id)
    }

    /// Queue statistics combined with worker counts supplied by the pool.
    pub async fn stats(&self, workers: WorkerCounts) -> Result<QueueStats, QueueError> {
        Ok(QueueStats {
            jobs: self.store.counts().await?,
            workers,
        })
    }

    /// Register a running job's advisory cancellation flag and build the
    /// handler context. Called by the worker that claimed the job.
    pub(crate) fn register_running(&self, job: &Job) -> JobContext {
        let token = CancellationToken::new();
        self.running.insert(job.id, token.clone());
        JobContext {
            job_id: job.id,
            attempt: job.attempts + 1,
            cancellation: token,
        }
    }

    /// Drop a finished job's cancellation flag.
    pub(crate) fn clear_running(&self, id: Uuid) {
        self.running.remove(&id);
    }

    /// Re-index a job after a back-off delay has elapsed. The job is already
    /// `Pending` in the store.
    pub(crate) async fn requeue(&self, job: &Job) {
        let mut heap = self.heap.write().await;
        heap.push(QueueEntry::for_job(job));
        drop(heap);
        self.wake.notify_one();
    }

    /// Schedule a delayed re-index for a job whose attempt just failed.
    pub(crate) fn requeue_after(self: &Arc<Self>, job: Job, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Cancellation during back-off is handled by the claim CAS.
            debug!("Back-off elapsed for job {}, re-indexing", job.id);
            queue.requeue(&job).await;
        });
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
