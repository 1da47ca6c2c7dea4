//! Schedule evaluation loop.
//!
//! The scheduler has no execution path of its own. Every fire goes through
//! the same queue enqueue call a direct submitter would use.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use jobmill_workqueue::{EnqueueOptions, JobQueue};

use crate::config::SchedulerConfig;
use crate::cron::{CronExpr, same_minute};
use crate::error::SchedulerError;
use crate::schedule::Schedule;
use crate::store::ScheduleStore;

/// Aggregate counts over the schedule set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStats {
    pub total: u64,
    pub enabled: u64,
    pub disabled: u64,
    pub total_runs: u64,
}

/// Converts recurring schedule definitions into queue submissions.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn ScheduleStore>,
    queue: Arc<JobQueue>,
}

impl Scheduler {
    /// Create a scheduler over a schedule store and a job queue.
    pub fn new(config: SchedulerConfig, store: Arc<dyn ScheduleStore>, queue: Arc<JobQueue>) -> Self {
        Self {
            config,
            store,
            queue,
        }
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Create a new enabled schedule. The cron expression is validated here,
    /// so a stored schedule always parses.
    pub async fn create_schedule(
        &self,
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        job_type: impl Into<String>,
        payload_template: Value,
    ) -> Result<Uuid, SchedulerError> {
        let cron_expression = cron_expression.into();
        let cron = CronExpr::parse(&cron_expression)?;
        let next_fire = cron.next_after(Utc::now());

        let schedule = Schedule::new(name, cron_expression, job_type, payload_template);
        self.store.insert(&schedule).await?;
        info!(
            "Created schedule {} '{}' ({} -> {}, next fire {:?})",
            schedule.id, schedule.name, schedule.cron_expression, schedule.job_type, next_fire
        );
        Ok(schedule.id)
    }

    /// Stop evaluating a schedule. Idempotent.
    pub async fn pause_schedule(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.set_enabled(id, false).await
    }

    /// Resume evaluating a paused schedule. Idempotent.
    pub async fn resume_schedule(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.set_enabled(id, true).await
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), SchedulerError> {
        let mut schedule = self
            .store
            .get(id)
            .await?
            .ok_or(SchedulerError::NotFound(id))?;
        if schedule.enabled != enabled {
            schedule.enabled = enabled;
            self.store.update(&schedule).await?;
            info!(
                "Schedule {} '{}' {}",
                id,
                schedule.name,
                if enabled { "resumed" } else { "paused" }
            );
        }
        Ok(())
    }

    /// Delete a schedule.
    pub async fn remove_schedule(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.store.remove(id).await?;
        info!("Removed schedule {}", id);
        Ok(())
    }

    /// Look up a schedule by id.
    pub async fn get_schedule(&self, id: Uuid) -> Result<Option<Schedule>, SchedulerError> {
        self.store.get(id).await
    }

    /// List all schedules.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>, SchedulerError> {
        self.store.list().await
    }

    /// Aggregate schedule counts.
    pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        let schedules = self.store.list().await?;
        let mut stats = SchedulerStats {
            total: schedules.len() as u64,
            ..Default::default()
        };
        for schedule in &schedules {
            if schedule.enabled {
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
            stats.total_runs += schedule.run_count;
        }
        Ok(stats)
    }

    /// Evaluate every enabled schedule against `now` and enqueue jobs for the
    /// ones whose minute matches. Returns the number of jobs enqueued.
    ///
    /// A schedule that already fired within the current minute is skipped, so
    /// repeated ticks inside one minute produce exactly one job.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let schedules = self.store.list().await?;
        let mut fired = 0;

        for mut schedule in schedules {
            if !schedule.enabled {
                continue;
            }

            let cron = match CronExpr::parse(&schedule.cron_expression) {
                Ok(cron) => cron,
                // Creation validates expressions; an unparsable stored one is
                // skipped rather than wedging the whole tick.
                Err(e) => {
                    warn!("Skipping schedule {}: {}", schedule.id, e);
                    continue;
                }
            };

            if !cron.matches(now) {
                continue;
            }
            if let Some(last) = schedule.last_fired_at {
                if same_minute(last, now) {
                    continue;
                }
            }

            let job_id = self
                .queue
                .enqueue(
                    schedule.job_type.clone(),
                    schedule.payload_template.clone(),
                    EnqueueOptions::default(),
                )
                .await?;
            schedule.last_fired_at = Some(now);
            schedule.run_count += 1;
            self.store.update(&schedule).await?;

            info!(
                "Schedule {} '{}' fired job {} (run {})",
                schedule.id, schedule.name, job_id, schedule.run_count
            );
            fired += 1;
        }

        Ok(fired)
    }

    /// Run the scheduler, ticking at the configured interval until shutdown.
    pub async fn run_loop(
        self: Arc<Self>,
        mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    ) {
        info!(
            "Scheduler started (tick every {}s)",
            self.config.tick_interval_secs
        );
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("Scheduler tick failed: {}", e);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
