// ABOUTME: Runtime record of one orchestrator invocation.
// ABOUTME: Tracks the current step, every step visited, the terminal status, and its exit code.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, ErrorKind};

use super::request::DeploymentRequest;

/// Where a run is. Terminal states are `Succeeded`, `RolledBack`, and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Start,
    LockAcquired,
    Validated,
    Built,
    Deployed,
    Healthy,
    PostTasksDone,
    Succeeded,
    RollingBack,
    RolledBack,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Start => "START",
            RunState::LockAcquired => "LOCK_ACQUIRED",
            RunState::Validated => "VALIDATED",
            RunState::Built => "BUILT",
            RunState::Deployed => "DEPLOYED",
            RunState::Healthy => "HEALTHY",
            RunState::PostTasksDone => "POST_TASKS_DONE",
            RunState::Succeeded => "SUCCEEDED",
            RunState::RollingBack => "ROLLING_BACK",
            RunState::RolledBack => "ROLLED_BACK",
            RunState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::RolledBack | RunState::Failed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    RolledBack,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::RolledBack => "ROLLED_BACK",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRun {
    pub request: DeploymentRequest,
    pub current: RunState,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Classification of the failure that ended or diverted the run.
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Every state entered, in order.
    pub history: Vec<RunState>,
    pub rollback_attempts: u32,
    pub warnings: Diagnostics,
}

impl DeploymentRun {
    pub fn new(request: DeploymentRequest) -> Self {
        Self {
            request,
            current: RunState::Start,
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            error_kind: None,
            error: None,
            history: vec![RunState::Start],
            rollback_attempts: 0,
            warnings: Diagnostics::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Enter `state`. Ignored once the run is terminal.
    pub fn advance(&mut self, state: RunState) {
        if self.is_terminal() {
            tracing::debug!(state = %state, "ignoring transition of a finished run");
            return;
        }
        tracing::debug!(from = %self.current, to = %state, "run state change");
        self.current = state;
        self.history.push(state);
    }

    pub fn succeed(&mut self) {
        self.advance(RunState::Succeeded);
        self.finish(RunStatus::Succeeded);
    }

    /// End the run as failed because of `error`.
    pub fn fail(&mut self, error: &Error) {
        self.error_kind = Some(error.kind());
        self.error = Some(error.to_string());
        self.advance(RunState::Failed);
        self.finish(RunStatus::Failed);
    }

    /// A step after deploy began failed with `cause`; a rollback follows.
    pub fn begin_rollback(&mut self, cause: &Error) {
        self.error_kind = Some(cause.kind());
        self.error = Some(cause.to_string());
        self.rollback_attempts += 1;
        self.advance(RunState::RollingBack);
    }

    /// Rollback finished. The run keeps the classification of its cause.
    pub fn rolled_back(&mut self) {
        self.advance(RunState::RolledBack);
        self.finish(RunStatus::RolledBack);
    }

    pub fn warn(&mut self, warning: Warning) {
        self.warnings.warn(warning);
    }

    fn finish(&mut self, status: RunStatus) {
        if self.status == RunStatus::Running {
            self.status = status;
            self.ended_at = Some(Utc::now());
        }
    }

    /// Outcome classification; `Success` unless the run failed or rolled back.
    pub fn exit_kind(&self) -> ErrorKind {
        match self.status {
            RunStatus::Succeeded => ErrorKind::Success,
            RunStatus::Running => ErrorKind::GenericFailure,
            RunStatus::Failed | RunStatus::RolledBack => {
                self.error_kind.unwrap_or(ErrorKind::GenericFailure)
            }
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_kind().code()
    }

    pub fn reached(&self, state: RunState) -> bool {
        self.history.contains(&state)
    }
}
