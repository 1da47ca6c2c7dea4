//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between schedule evaluation ticks. Independent of the worker
    /// poll interval; cron resolution is one minute, so anything well under
    /// 60 works.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Schedule database path. `None` keeps schedules in memory only.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_tick_interval_secs() -> u64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            db_path: None,
        }
    }
}

impl SchedulerConfig {
    /// Tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}
