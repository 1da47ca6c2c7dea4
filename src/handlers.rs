//! Built-in job handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use jobmill_workqueue::{HandlerRegistry, JobContext, JobHandler, QueueError};

/// Registry pre-loaded with the built-in handlers.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("notification", Arc::new(NotificationHandler));
    registry.register("sleep", Arc::new(SleepHandler));
    registry
}

/// Logs a notification. Payload: `{ "title": string, "message": string? }`.
pub struct NotificationHandler;

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn execute(&self, payload: &Value, ctx: &JobContext) -> Result<Value, QueueError> {
        let title = payload
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                QueueError::Execution("notification payload missing 'title'".to_string())
            })?;
        let message = payload.get("message").and_then(Value::as_str).unwrap_or("");

        info!("[notification] {}: {} (job {})", title, message, ctx.job_id);
        Ok(json!({ "delivered_at": Utc::now().to_rfc3339() }))
    }
}

/// Sleeps for `duration` milliseconds, waking early on cancellation.
/// Payload: `{ "duration": number }`.
pub struct SleepHandler;

#[async_trait]
impl JobHandler for SleepHandler {
    async fn execute(&self, payload: &Value, ctx: &JobContext) -> Result<Value, QueueError> {
        let duration_ms = payload
            .get("duration")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                QueueError::Execution("sleep payload missing 'duration'".to_string())
            })?;

        let interrupted = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => false,
            _ = ctx.cancellation.cancelled() => true,
        };

        Ok(json!({ "duration": duration_ms, "interrupted": interrupted }))
    }
}
