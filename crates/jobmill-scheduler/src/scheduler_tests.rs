use super::*;
use crate::store::MemoryScheduleStore;
use chrono::TimeZone;
use jobmill_workqueue::{JobFilter, JobStatus, MemoryJobStore, QueueConfig};
use serde_json::json;

fn scheduler() -> Scheduler {
    let queue = Arc::new(JobQueue::new(
        QueueConfig::default(),
        Arc::new(MemoryJobStore::new()),
    ));
    Scheduler::new(
        SchedulerConfig::default(),
        Arc::new(MemoryScheduleStore::new()),
        queue,
    )
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
}

#[tokio::test]
async fn test_create_validates_cron() {
    let scheduler = scheduler();

    let result = scheduler
        .create_schedule("bad", "not a cron", "notification", Value::Null)
        .await;
    assert!(matches!(result, Err(SchedulerError::InvalidCron { .. })));

    let id = scheduler
        .create_schedule("good", "* * * * *", "notification", Value::Null)
        .await
        .unwrap();
    let schedule = scheduler.get_schedule(id).await.unwrap().unwrap();
    assert!(schedule.enabled);
}

#[tokio::test]
async fn test_tick_fires_once_per_minute_never_twice() {
    let scheduler = scheduler();
    scheduler
        .create_schedule("every-minute", "* * * * *", "notification", json!({"title": "x"}))
        .await
        .unwrap();

    // Repeated ticks inside the same minute fire exactly once
    assert_eq!(scheduler.tick(at(9, 30, 0)).await.unwrap(), 1);
    assert_eq!(scheduler.tick(at(9, 30, 10)).await.unwrap(), 0);
    assert_eq!(scheduler.tick(at(9, 30, 59)).await.unwrap(), 0);

    // The next minute fires again
    assert_eq!(scheduler.tick(at(9, 31, 5)).await.unwrap(), 1);

    let pending = scheduler
        .queue
        .list_jobs(JobFilter::by_status(JobStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn test_fired_job_carries_template() {
    let scheduler = scheduler();
    scheduler
        .create_schedule(
            "report",
            "* * * * *",
            "notification",
            json!({"title": "daily", "message": "ready"}),
        )
        .await
        .unwrap();

    scheduler.tick(at(9, 30, 0)).await.unwrap();

    let jobs = scheduler.queue.list_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, "notification");
    assert_eq!(jobs[0].payload, json!({"title": "daily", "message": "ready"}));
    assert_eq!(jobs[0].status, JobStatus::Pending);
}

#[tokio::test]
async fn test_non_matching_minute_does_not_fire() {
    let scheduler = scheduler();
    scheduler
        .create_schedule("at-nine-thirty", "30 9 * * *", "notification", Value::Null)
        .await
        .unwrap();

    assert_eq!(scheduler.tick(at(9, 29, 0)).await.unwrap(), 0);
    assert_eq!(scheduler.tick(at(9, 30, 0)).await.unwrap(), 1);
    assert_eq!(scheduler.tick(at(9, 31, 0)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pause_resume() {
    let scheduler = scheduler();
    let id = scheduler
        .create_schedule("pausable", "* * * * *", "notification", Value::Null)
        .await
        .unwrap();

    scheduler.pause_schedule(id).await.unwrap();
    assert_eq!(scheduler.tick(at(9, 30, 0)).await.unwrap(), 0);
    assert!(!scheduler.get_schedule(id).await.unwrap().unwrap().enabled);

    scheduler.resume_schedule(id).await.unwrap();
    assert_eq!(scheduler.tick(at(9, 31, 0)).await.unwrap(), 1);

    // Fire bookkeeping advanced only once
    let schedule = scheduler.get_schedule(id).await.unwrap().unwrap();
    assert_eq!(schedule.run_count, 1);
    assert_eq!(schedule.last_fired_at, Some(at(9, 31, 0)));
}

#[tokio::test]
async fn test_pause_unknown_schedule() {
    let scheduler = scheduler();
    let result = scheduler.pause_schedule(Uuid::new_v4()).await;
    assert!(matches!(result, Err(SchedulerError::NotFound(_))));
}

#[tokio::test]
async fn test_remove_schedule_stops_fires() {
    let scheduler = scheduler();
    let id = scheduler
        .create_schedule("doomed", "* * * * *", "notification", Value::Null)
        .await
        .unwrap();

    scheduler.remove_schedule(id).await.unwrap();
    assert!(scheduler.get_schedule(id).await.unwrap().is_none());
    assert_eq!(scheduler.tick(at(9, 30, 0)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stats() {
    let scheduler = scheduler();
    let a = scheduler
        .create_schedule("a", "* * * * *", "notification", Value::Null)
        .await
        .unwrap();
    scheduler
        .create_schedule("b", "30 9 * * *", "notification", Value::Null)
        .await
        .unwrap();
    scheduler.pause_schedule(a).await.unwrap();

    let stats = scheduler.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.enabled, 1);
    assert_eq!(stats.disabled, 1);
    assert_eq!(stats.total_runs, 0);
}
