// ABOUTME: Post-start container health wait configuration.
// ABOUTME: Bounded polling window and the log tail captured on failure.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Lines of container output kept in the run report on failure.
    #[serde(default = "default_log_lines")]
    pub log_lines: usize,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_log_lines() -> usize {
    50
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            timeout: default_timeout(),
            interval: default_interval(),
            log_lines: default_log_lines(),
        }
    }
}
