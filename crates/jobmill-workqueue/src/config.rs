//! Queue configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of concurrent workers.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Worker poll interval in milliseconds when the queue is idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Base delay for exponential retry back-off, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single back-off delay, in milliseconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,

    /// Database path for job persistence (None = in-memory store).
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_max_workers() -> u32 {
    4
}

fn default_poll_interval() -> u64 {
    500
}

fn default_backoff_base() -> u64 {
    1_000
}

fn default_backoff_cap() -> u64 {
    60_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            poll_interval_ms: default_poll_interval(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            db_path: None,
        }
    }
}

impl QueueConfig {
    /// Back-off delay before re-dispatching a job that has failed
    /// `attempts` times: `base * 2^(attempts - 1)`, capped.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_cap_ms);
        Duration::from_millis(ms)
    }

    /// Idle poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = QueueConfig {
            backoff_base_ms: 100,
            backoff_cap_ms: 350,
            ..Default::default()
        };

        assert_eq!(config.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(config.backoff_delay(30), Duration::from_millis(350));
    }
}
