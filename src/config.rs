//! Daemon configuration loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use jobmill_scheduler::SchedulerConfig;
use jobmill_workqueue::QueueConfig;

/// Top-level daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.fill_default_paths()?;
        Ok(config)
    }

    /// Point unset database paths at the per-user data directory, so a bare
    /// `jobmill run` is durable out of the box.
    fn fill_default_paths(&mut self) -> anyhow::Result<()> {
        let data_dir = default_data_dir()?;
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        if self.queue.db_path.is_none() {
            self.queue.db_path = Some(data_dir.join("jobs.db"));
        }
        if self.scheduler.db_path.is_none() {
            self.scheduler.db_path = Some(data_dir.join("schedules.db"));
        }
        Ok(())
    }
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("jobmill"))
        .context("no data directory available for this platform")
}
