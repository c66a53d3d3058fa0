// ABOUTME: Automatic rollback to the previously active release.
// ABOUTME: Available once the deploy step has begun; runs once through its own retry policy.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::Version;

use super::Deployment;
use super::state::RollbackPoint;
use super::transitions::{Collaborators, run_step};

/// What a rollback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "version", rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The previous release was reapplied.
    Reverted(Version),
    /// No release was ever recorded for the environment.
    NothingToRevert,
}

impl<S: RollbackPoint> Deployment<S> {
    /// Reapply the release that was active before this run.
    ///
    /// Bypasses the `deploy-target` breaker, which is likely open by now.
    ///
    /// # Errors
    ///
    /// Returns `Error::RollbackFailed` once the rollback retry policy is exhausted.
    pub async fn rollback(self, collaborators: &Collaborators) -> Result<RollbackOutcome> {
        let ctx = self.state.context();

        let Some(previous) = ctx.previous_version else {
            tracing::warn!(
                environment = %ctx.environment,
                "No previous release recorded for {}, nothing to roll back to",
                ctx.environment
            );
            return Ok(RollbackOutcome::NothingToRevert);
        };

        tracing::warn!(
            environment = %ctx.environment,
            to_version = %previous,
            "Rolling back {} in {} to {}",
            ctx.service,
            ctx.environment,
            previous
        );

        let platform = collaborators.platform.as_ref();
        run_step(
            "rollback",
            &self.descriptor.retry.rollback,
            None,
            self.descriptor.timeouts.rollback,
            move |_| async move { platform.rollback(ctx, &previous).await },
        )
        .await
        .map_err(|e| Error::RollbackFailed(e.to_string()))?;

        tracing::info!(to_version = %previous, "Rolled back to {previous}");
        Ok(RollbackOutcome::Reverted(previous))
    }
}
