// ABOUTME: Hard per-attempt time limits for external calls.
// ABOUTME: No build, deploy, rollback, or post-deploy command may run longer than its limit.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StepTimeouts {
    #[serde(with = "humantime_serde")]
    pub build: Duration,

    #[serde(with = "humantime_serde")]
    pub deploy: Duration,

    #[serde(with = "humantime_serde")]
    pub rollback: Duration,

    #[serde(with = "humantime_serde")]
    pub post_task: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        StepTimeouts {
            build: Duration::from_secs(600),
            deploy: Duration::from_secs(300),
            rollback: Duration::from_secs(300),
            post_task: Duration::from_secs(60),
        }
    }
}
