use super::*;
use crate::handler::{JobContext, JobHandler};
use crate::job::JobPriority;
use crate::queue::EnqueueOptions;
use crate::store::MemoryJobStore;

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

fn test_config() -> QueueConfig {
    QueueConfig {
        max_workers: 2,
        poll_interval_ms: 10,
        backoff_base_ms: 1,
        backoff_cap_ms: 10,
        db_path: None,
    }
}

fn test_queue(config: &QueueConfig) -> Arc<JobQueue> {
    Arc::new(JobQueue::new(
        config.clone(),
        Arc::new(MemoryJobStore::new()),
    ))
}

async fn wait_for_status(queue: &JobQueue, id: Uuid, status: crate::job::JobStatus) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = queue.get_job(id).await.unwrap().unwrap();
        if job.status == status {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never reached {:?} (stuck at {:?})",
            id,
            status,
            job.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct OkHandler;

#[async_trait]
impl JobHandler for OkHandler {
    async fn execute(&self, payload: &Value, _ctx: &JobContext) -> Result<Value, QueueError> {
        Ok(json!({ "echo": payload }))
    }
}

struct AlwaysFailHandler {
    calls: AtomicU32,
}

#[async_trait]
impl JobHandler for AlwaysFailHandler {
    async fn execute(&self, _payload: &Value, _ctx: &JobContext) -> Result<Value, QueueError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Err(QueueError::Execution(format!("attempt {} exploded", call)))
    }
}

struct RecordingHandler {
    name: &'static str,
    delay: Duration,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn execute(&self, _payload: &Value, _ctx: &JobContext) -> Result<Value, QueueError> {
        self.log.lock().unwrap().push(self.name);
        tokio::time::sleep(self.delay).await;
        Ok(Value::Null)
    }
}

struct CancelAwareHandler;

#[async_trait]
impl JobHandler for CancelAwareHandler {
    async fn execute(&self, _payload: &Value, ctx: &JobContext) -> Result<Value, QueueError> {
        let stopped_early = tokio::select! {
            _ = ctx.cancellation.cancelled() => true,
            _ = tokio::time::sleep(Duration::from_secs(5)) => false,
        };
        Ok(json!({ "stopped_early": stopped_early }))
    }
}

#[test]
fn test_worker_new() {
    let worker = Worker::new(7);
    assert_eq!(worker.id(), 7);
    assert_eq!(worker.jobs_completed(), 0);
    assert_eq!(worker.jobs_failed(), 0);
}

#[tokio::test]
async fn test_worker_process_success() {
    let config = test_config();
    let queue = test_queue(&config);
    let mut registry = HandlerRegistry::new();
    registry.register("echo", Arc::new(OkHandler));

    let id = queue
        .enqueue("echo", json!({"k": "v"}), EnqueueOptions::default())
        .await
        .unwrap();
    let job = queue.dequeue_next().await.unwrap().unwrap();

    let worker = Worker::new(0);
    worker.process(job, &registry, &queue).await.unwrap();
    assert_eq!(worker.jobs_completed(), 1);

    let job = queue.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, crate::job::JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"echo": {"k": "v"}})));
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn test_handler_not_found_fails_without_retry() {
    let config = test_config();
    let queue = test_queue(&config);
    let registry = HandlerRegistry::new();

    let id = queue
        .enqueue("ghost", Value::Null, EnqueueOptions::default())
        .await
        .unwrap();
    let job = queue.dequeue_next().await.unwrap().unwrap();

    Worker::new(0).process(job, &registry, &queue).await.unwrap();

    let job = queue.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, crate::job::JobStatus::Failed);
    assert_eq!(job.attempts, 0);
    assert!(job.error.unwrap().contains("No handler registered"));
    // Nothing was requeued
    assert!(queue.dequeue_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failing_job_retries_then_fails_with_latest_error() {
    let config = test_config();
    let queue = test_queue(&config);
    let mut registry = HandlerRegistry::new();
    registry.register(
        "doomed",
        Arc::new(AlwaysFailHandler {
            calls: AtomicU32::new(0),
        }),
    );
    let registry = Arc::new(registry);

    let id = queue
        .enqueue(
            "doomed",
            Value::Null,
            EnqueueOptions {
                max_attempts: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let pool = Arc::new(WorkerPool::new(config));
    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.clone().run_loop(
        queue.clone(),
        registry,
        shutdown_tx.subscribe(),
    ));

    let job = wait_for_status(&queue, id, crate::job::JobStatus::Failed).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    // Exactly max_attempts executions, most recent error recorded
    assert_eq!(job.attempts, 3);
    assert_eq!(
        job.error.as_deref(),
        Some("Handler execution failed: attempt 3 exploded")
    );
}

#[tokio::test]
async fn test_high_priority_runs_before_low_with_one_worker() {
    let config = QueueConfig {
        max_workers: 1,
        ..test_config()
    };
    let queue = test_queue(&config);
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut registry = HandlerRegistry::new();
    registry.register(
        "sleep",
        Arc::new(RecordingHandler {
            name: "sleep",
            delay: Duration::from_millis(50),
            log: log.clone(),
        }),
    );
    registry.register(
        "notification",
        Arc::new(RecordingHandler {
            name: "notification",
            delay: Duration::ZERO,
            log: log.clone(),
        }),
    );
    let registry = Arc::new(registry);

    // Low-priority sleep enqueued first, high-priority notification second
    let sleep_id = queue
        .enqueue(
            "sleep",
            json!({"duration": 50}),
            EnqueueOptions {
                priority: JobPriority::Low,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let notify_id = queue
        .enqueue(
            "notification",
            json!({"title": "x"}),
            EnqueueOptions {
                priority: JobPriority::High,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let pool = Arc::new(WorkerPool::new(config));
    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.clone().run_loop(
        queue.clone(),
        registry,
        shutdown_tx.subscribe(),
    ));

    wait_for_status(&queue, notify_id, crate::job::JobStatus::Completed).await;
    wait_for_status(&queue, sleep_id, crate::job::JobStatus::Completed).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["notification", "sleep"]);
}

#[tokio::test]
async fn test_cancel_running_job_is_advisory() {
    let config = test_config();
    let queue = test_queue(&config);
    let mut registry = HandlerRegistry::new();
    registry.register("watchful", Arc::new(CancelAwareHandler));
    let registry = Arc::new(registry);

    let id = queue
        .enqueue("watchful", Value::Null, EnqueueOptions::default())
        .await
        .unwrap();

    let pool = Arc::new(WorkerPool::new(config));
    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.clone().run_loop(
        queue.clone(),
        registry,
        shutdown_tx.subscribe(),
    ));

    wait_for_status(&queue, id, crate::job::JobStatus::Running).await;
    let outcome = queue.cancel_job(id).await.unwrap();
    assert!(outcome.success);
    assert!(outcome.reason.is_some());

    // The handler observed the flag and recorded its real outcome
    let job = wait_for_status(&queue, id, crate::job::JobStatus::Completed).await;
    assert_eq!(job.result, Some(json!({"stopped_early": true})));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_pool_counts_and_drain() {
    let config = test_config();
    let pool = WorkerPool::new(config);

    assert!(!pool.is_running());
    assert_eq!(pool.available_workers(), 2);
    let counts = pool.worker_counts();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.busy, 0);

    pool.start();
    assert!(pool.is_running());
    pool.drain().await;
    pool.stop();
    assert!(!pool.is_running());
}
