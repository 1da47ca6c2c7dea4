use super::*;
use serde_json::json;

#[test]
fn test_job_new() {
    let job = Job::new("notification", json!({"title": "x"}));
    assert_eq!(job.job_type, "notification");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.priority, JobPriority::Normal);
    assert_eq!(job.attempts, 0);
    assert!(job.started_at.is_none());
    assert!(job.error.is_none());
    assert!(job.result.is_none());
}

#[test]
fn test_priority_order() {
    assert!(JobPriority::Urgent > JobPriority::High);
    assert!(JobPriority::High > JobPriority::Normal);
    assert!(JobPriority::Normal > JobPriority::Low);
}

#[test]
fn test_priority_roundtrip() {
    for p in [
        JobPriority::Low,
        JobPriority::Normal,
        JobPriority::High,
        JobPriority::Urgent,
    ] {
        assert_eq!(JobPriority::from_i64(p.as_i64()), p);
    }
}

#[test]
fn test_status_roundtrip() {
    for s in [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ] {
        assert_eq!(JobStatus::parse(s.as_str()), Some(s));
    }
    assert_eq!(JobStatus::parse("bogus"), None);
}

#[test]
fn test_can_retry() {
    let mut job = Job::new("test", Value::Null).with_max_attempts(3);
    assert!(job.can_retry());
    job.attempts = 3;
    assert!(!job.can_retry());
}

#[test]
fn test_patch_apply() {
    let mut job = Job::new("test", Value::Null);

    JobPatch::running(Utc::now()).apply(&mut job);
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.started_at.is_some());

    JobPatch::completed(json!({"ok": true})).apply(&mut job);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"ok": true})));
    assert!(job.completed_at.is_some());
}

#[test]
fn test_requeue_clears_started_at() {
    let mut job = Job::new("test", Value::Null);
    JobPatch::running(Utc::now()).apply(&mut job);
    assert!(job.started_at.is_some());

    // Back to pending for the next attempt, with no stale start time
    JobPatch::requeued(1).apply(&mut job);
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.started_at.is_none());

    // The next claim stamps it afresh
    JobPatch::running(Utc::now()).apply(&mut job);
    assert!(job.started_at.is_some());
}

#[test]
fn test_patch_failed_records_latest_error() {
    let mut job = Job::new("test", Value::Null);

    JobPatch::requeued(1).apply(&mut job);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert!(job.error.is_none());

    JobPatch::failed(2, "second error").apply(&mut job);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
    assert_eq!(job.error.as_deref(), Some("second error"));
}
