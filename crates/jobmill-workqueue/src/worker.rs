//! Worker pool for job execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::handler::HandlerRegistry;
use crate::job::{Job, JobPatch};
use crate::queue::{JobQueue, WorkerCounts};

/// A single worker execution slot.
pub struct Worker {
    id: u32,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Worker {
    /// Create a new worker.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// Get worker ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Get completed job count.
    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::SeqCst)
    }

    /// Get failed job count (terminal failures and failed attempts).
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::SeqCst)
    }

    /// Execute a claimed job and record its outcome in the store.
    ///
    /// The job is already `Running` (the dequeue claim made it so). An
    /// unknown job type fails immediately without retries; handler failures
    /// requeue the same id with exponential back-off until `max_attempts`,
    /// then mark the job failed with the most recent error.
    pub async fn process(
        &self,
        job: Job,
        registry: &HandlerRegistry,
        queue: &Arc<JobQueue>,
    ) -> Result<(), QueueError> {
        debug!("Worker {} processing job {} ({})", self.id, job.id, job.job_type);

        let Some(handler) = registry.get(&job.job_type) else {
            let err = QueueError::HandlerNotFound(job.job_type.clone());
            warn!("Worker {}: {}", self.id, err);
            self.jobs_failed.fetch_add(1, Ordering::SeqCst);
            queue
                .store()
                .update(job.id, JobPatch::failed(job.attempts, err.to_string()))
                .await?;
            return Ok(());
        };

        let ctx = queue.register_running(&job);
        let outcome = handler.execute(&job.payload, &ctx).await;
        queue.clear_running(job.id);

        match outcome {
            Ok(result) => {
                self.jobs_completed.fetch_add(1, Ordering::SeqCst);
                debug!("Worker {} completed job {}", self.id, job.id);
                queue.store().update(job.id, JobPatch::completed(result)).await?;
            }
            Err(e) => {
                self.jobs_failed.fetch_add(1, Ordering::SeqCst);
                let attempts = job.attempts + 1;

                if attempts < job.max_attempts {
                    let delay = queue.config().backoff_delay(attempts);
                    warn!(
                        "Worker {}: job {} attempt {}/{} failed: {} (retrying in {:?})",
                        self.id, job.id, attempts, job.max_attempts, e, delay
                    );
                    let requeued = queue
                        .store()
                        .update(job.id, JobPatch::requeued(attempts))
                        .await?;
                    queue.requeue_after(requeued, delay);
                } else {
                    error!(
                        "Worker {}: job {} failed after {} attempts: {}",
                        self.id, job.id, attempts, e
                    );
                    queue
                        .store()
                        .update(job.id, JobPatch::failed(attempts, e.to_string()))
                        .await?;
                }
            }
        }

        Ok(())
    }
}

/// Worker pool bounding concurrent job execution.
pub struct WorkerPool {
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    total_processed: Arc<AtomicU64>,
    next_worker_id: AtomicU32,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(config: QueueConfig) -> Self {
        let permits = config.max_workers as usize;
        Self {
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            running: Arc::new(AtomicBool::new(false)),
            total_processed: Arc::new(AtomicU64::new(0)),
            next_worker_id: AtomicU32::new(0),
        }
    }

    /// Start the worker pool.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Worker pool started with {} workers", self.config.max_workers);
    }

    /// Stop accepting new jobs.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Worker pool stopped");
    }

    /// Check if pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total jobs processed across all workers.
    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::SeqCst)
    }

    /// Number of free worker slots.
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Worker slot counts for the stats surface.
    pub fn worker_counts(&self) -> WorkerCounts {
        let total = self.config.max_workers;
        let busy = total.saturating_sub(self.available_workers() as u32);
        WorkerCounts { total, busy }
    }

    /// Submit a claimed job for execution on a free worker slot.
    pub async fn submit(
        &self,
        job: Job,
        registry: Arc<HandlerRegistry>,
        queue: Arc<JobQueue>,
    ) -> Result<(), QueueError> {
        if !self.is_running() {
            return Err(QueueError::Execution("pool is not running".to_string()));
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| QueueError::Execution(e.to_string()))?;

        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let total_processed = self.total_processed.clone();

        tokio::spawn(async move {
            let worker = Worker::new(worker_id);
            if let Err(e) = worker.process(job, &registry, &queue).await {
                error!("Worker {} store failure: {}", worker_id, e);
            }
            total_processed.fetch_add(1, Ordering::SeqCst);
            drop(permit);
        });

        Ok(())
    }

    /// Run the pool, pulling jobs from the queue until shutdown.
    ///
    /// Workers block on the queue wake signal with a poll-interval fallback.
    /// Shutdown stops new dispatch; in-flight handlers run to completion
    /// (see [`WorkerPool::drain`]).
    pub async fn run_loop(
        self: Arc<Self>,
        queue: Arc<JobQueue>,
        registry: Arc<HandlerRegistry>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        self.start();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Worker pool shutting down");
                    break;
                }
                dequeued = async {
                    // Only pull work when a slot is free, so a full pool
                    // never claims jobs it cannot start.
                    if self.available_workers() == 0 {
                        tokio::time::sleep(self.config.poll_interval()).await;
                        return None;
                    }
                    match queue.dequeue_next().await {
                        Ok(Some(job)) => Some(job),
                        Ok(None) => {
                            tokio::select! {
                                _ = queue.notified() => {}
                                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                            }
                            None
                        }
                        Err(e) => {
                            error!("Dequeue failed: {}", e);
                            tokio::time::sleep(self.config.poll_interval()).await;
                            None
                        }
                    }
                } => {
                    if let Some(job) = dequeued {
                        if let Err(e) = self.submit(job, registry.clone(), queue.clone()).await {
                            error!("Failed to submit job: {}", e);
                        }
                    }
                }
            }
        }

        self.stop();
    }

    /// Wait for all in-flight jobs to finish.
    pub async fn drain(&self) {
        let all = self.config.max_workers;
        if let Ok(permits) = self.semaphore.acquire_many(all).await {
            drop(permits);
        }
        info!("Worker pool drained");
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
