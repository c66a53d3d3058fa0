// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports the request, state markers, transitions, run record, and orchestrator.

mod deployment;
mod orchestrator;
mod release;
mod request;
mod rollback;
mod run;
mod state;
mod transitions;

pub use deployment::Deployment;
pub use orchestrator::Orchestrator;
pub use release::{HISTORY_LIMIT, ReleaseRecord};
pub use request::DeploymentRequest;
pub use rollback::RollbackOutcome;
pub use run::{DeploymentRun, RunState, RunStatus};
pub use state::{Built, Completed, Deployed, Healthy, Locked, RollbackPoint, Validated};
pub use transitions::{BUILD_BREAKER, Collaborators, DEPLOY_BREAKER, TransitionResult};

/// Release records kept in the state store.
pub mod releases {
    pub use super::release::{current, current_key, history, history_key, record};
}
