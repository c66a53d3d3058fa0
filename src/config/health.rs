// ABOUTME: Post-deploy readiness probe configuration.
// ABOUTME: Probes run a fixed number of times at a fixed interval, each bounded by a timeout.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthConfig {
    /// Shell command that exits 0 when the new version is ready.
    pub cmd: String,

    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Grace period before the first probe.
    #[serde(default, with = "humantime_serde")]
    pub start_period: Duration,
}

fn default_attempts() -> u32 {
    10
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}
