// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: Each state carries the data that only exists once that state is reached.

use crate::platform::{Artifact, StepContext};

/// Lock held, nothing checked yet.
/// Available actions: `validate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Locked;

/// Inputs checked and step context resolved.
/// Available actions: `plan()`, `build()`
#[derive(Debug, Clone)]
pub struct Validated {
    pub(crate) context: StepContext,
}

/// Artifact produced.
/// Available actions: `deploy()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Built {
    pub(crate) context: StepContext,
    pub(crate) artifact: Artifact,
}

/// Artifact active in the environment, not yet verified.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Deployed {
    pub(crate) context: StepContext,
    pub(crate) artifact: Artifact,
}

/// Readiness probes passed.
/// Available actions: `post_tasks()`
#[derive(Debug, Clone)]
pub struct Healthy {
    pub(crate) context: StepContext,
    pub(crate) artifact: Artifact,
}

/// Release recorded and post-deploy tasks run.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) context: StepContext,
    pub(crate) artifact: Artifact,
}

/// States a failed run may roll back from: the deploy step has begun.
pub trait RollbackPoint {
    fn context(&self) -> &StepContext;
}

impl RollbackPoint for Built {
    fn context(&self) -> &StepContext {
        &self.context
    }
}

impl RollbackPoint for Deployed {
    fn context(&self) -> &StepContext {
        &self.context
    }
}
