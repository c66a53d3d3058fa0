// ABOUTME: Per-step retry policies for build, deploy, and rollback.
// ABOUTME: Each step retries independently with its own backoff schedule.

use serde::Deserialize;
use std::time::Duration;

use crate::resilience::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub build: RetryPolicy,
    pub deploy: RetryPolicy,
    pub rollback: RetryPolicy,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (step, policy) in [
            ("build", &self.build),
            ("deploy", &self.deploy),
            ("rollback", &self.rollback),
        ] {
            policy.validate().map_err(|e| format!("retry.{step}: {e}"))?;
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            build: RetryPolicy::new(3, Duration::from_secs(5), 2.0),
            deploy: RetryPolicy::new(3, Duration::from_secs(10), 2.0),
            rollback: RetryPolicy::new(2, Duration::from_secs(5), 1.0),
        }
    }
}
