// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: State types carry their own data for compile-time guarantees.

use crate::config::Descriptor;
use crate::platform::{Artifact, StepContext};
use crate::types::{Environment, ServiceName, Version};

use super::request::DeploymentRequest;
use super::state::{Built, Completed, Deployed, Healthy, Locked, Validated};

/// A deployment in progress, parameterized by its current state.
///
/// Transitions consume the deployment and return the next state, so a step
/// cannot run out of order and an artifact cannot be deployed before it exists.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) request: DeploymentRequest,
    pub(crate) descriptor: Descriptor,
    pub(crate) state: S,
}

impl Deployment<Locked> {
    /// Start a deployment once the scope lock is held.
    ///
    /// `descriptor` is the full descriptor; validation merges in the target
    /// environment's overrides.
    pub fn new(request: DeploymentRequest, descriptor: Descriptor) -> Self {
        Deployment {
            request,
            descriptor,
            state: Locked,
        }
    }
}

impl<S> Deployment<S> {
    pub fn request(&self) -> &DeploymentRequest {
        &self.request
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.descriptor.service
    }

    pub fn environment(&self) -> Environment {
        self.request.environment()
    }

    pub fn version(&self) -> Version {
        self.request.version()
    }
}

impl Deployment<Validated> {
    pub fn context(&self) -> &StepContext {
        &self.state.context
    }
}

impl Deployment<Built> {
    pub fn context(&self) -> &StepContext {
        &self.state.context
    }

    pub fn artifact(&self) -> &Artifact {
        &self.state.artifact
    }
}

impl Deployment<Deployed> {
    pub fn context(&self) -> &StepContext {
        &self.state.context
    }

    pub fn artifact(&self) -> &Artifact {
        &self.state.artifact
    }
}

impl Deployment<Healthy> {
    pub fn context(&self) -> &StepContext {
        &self.state.context
    }

    pub fn artifact(&self) -> &Artifact {
        &self.state.artifact
    }
}

impl Deployment<Completed> {
    pub fn context(&self) -> &StepContext {
        &self.state.context
    }

    pub fn artifact(&self) -> &Artifact {
        &self.state.artifact
    }
}
