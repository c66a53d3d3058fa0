// ABOUTME: Seam between the deployment state machine and the systems it drives.
// ABOUTME: Defines the Platform trait, the per-step context, and the shell-command implementation.

mod command;
mod runner;

pub use command::CommandPlatform;
pub use runner::{CommandOutput, CommandRunner};

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::types::{Environment, ServiceName, Version};

pub const ENV_ENVIRONMENT: &str = "SHIPWRIGHT_ENVIRONMENT";
pub const ENV_SERVICE: &str = "SHIPWRIGHT_SERVICE";
pub const ENV_VERSION: &str = "SHIPWRIGHT_VERSION";
pub const ENV_ARTIFACT: &str = "SHIPWRIGHT_ARTIFACT";
pub const ENV_REGISTRY: &str = "SHIPWRIGHT_REGISTRY";
pub const ENV_DESCRIPTOR: &str = "SHIPWRIGHT_DESCRIPTOR";
pub const ENV_PREVIOUS_VERSION: &str = "SHIPWRIGHT_PREVIOUS_VERSION";

/// A built, deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub reference: String,
    pub version: Version,
}

/// Everything a step needs to know about the run it belongs to.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub environment: Environment,
    pub version: Version,
    pub service: ServiceName,
    pub registry: Option<String>,
    /// Environment descriptor file, resolved against the project directory.
    pub descriptor: Option<PathBuf>,
    /// Version active before this run, if one was ever recorded.
    pub previous_version: Option<Version>,
    /// Variables from the deployment descriptor, already resolved.
    pub env: HashMap<String, String>,
    pub project_dir: PathBuf,
}

impl StepContext {
    /// Artifact reference for `version`: `<registry>/<service>:<version>`.
    pub fn artifact_for(&self, version: &Version) -> Artifact {
        let reference = match &self.registry {
            Some(registry) => format!("{registry}/{}:{version}", self.service),
            None => format!("{}:{version}", self.service),
        };
        Artifact {
            reference,
            version: *version,
        }
    }

    pub fn artifact(&self) -> Artifact {
        self.artifact_for(&self.version)
    }

    /// Variables exported to step commands.
    ///
    /// Descriptor variables come first so the orchestrator's own values
    /// cannot be shadowed by them.
    pub fn to_env(&self, artifact: &Artifact) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.insert(ENV_ENVIRONMENT.to_string(), self.environment.to_string());
        env.insert(ENV_SERVICE.to_string(), self.service.to_string());
        env.insert(ENV_VERSION.to_string(), artifact.version.to_string());
        env.insert(ENV_ARTIFACT.to_string(), artifact.reference.clone());
        if let Some(registry) = &self.registry {
            env.insert(ENV_REGISTRY.to_string(), registry.clone());
        }
        if let Some(descriptor) = &self.descriptor {
            env.insert(ENV_DESCRIPTOR.to_string(), descriptor.display().to_string());
        }
        if let Some(previous) = &self.previous_version {
            env.insert(ENV_PREVIOUS_VERSION.to_string(), previous.to_string());
        }
        env
    }
}

/// The external collaborators of a deployment.
///
/// Each call is a single attempt; retries, circuit breaking, and time limits
/// are applied by the caller.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Produce the artifact for `ctx.version`.
    async fn build(&self, ctx: &StepContext) -> Result<Artifact>;

    /// Make `artifact` the active version in `ctx.environment`.
    async fn deploy(&self, ctx: &StepContext, artifact: &Artifact) -> Result<()>;

    /// One readiness probe. `Ok` means ready.
    async fn probe(&self, ctx: &StepContext) -> Result<()>;

    /// Reapply a previously active version.
    async fn rollback(&self, ctx: &StepContext, version: &Version) -> Result<()>;

    /// Run one post-deploy task.
    async fn post_task(&self, ctx: &StepContext, task: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(registry: Option<&str>) -> StepContext {
        StepContext {
            environment: Environment::Staging,
            version: Version::new(1, 2, 3),
            service: ServiceName::new("api").unwrap(),
            registry: registry.map(str::to_string),
            descriptor: None,
            previous_version: Some(Version::new(1, 2, 2)),
            env: HashMap::from([
                ("REGION".to_string(), "eu".to_string()),
                (ENV_VERSION.to_string(), "shadowed".to_string()),
            ]),
            project_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn artifact_reference_includes_registry() {
        assert_eq!(
            context(Some("registry.example.com")).artifact().reference,
            "registry.example.com/api:v1.2.3"
        );
        assert_eq!(context(None).artifact().reference, "api:v1.2.3");
    }

    #[test]
    fn exported_env_carries_run_details() {
        let ctx = context(Some("registry.example.com"));
        let env = ctx.to_env(&ctx.artifact());
        assert_eq!(env[ENV_ENVIRONMENT], "staging");
        assert_eq!(env[ENV_VERSION], "v1.2.3");
        assert_eq!(env[ENV_ARTIFACT], "registry.example.com/api:v1.2.3");
        assert_eq!(env[ENV_PREVIOUS_VERSION], "v1.2.2");
        assert_eq!(env["REGION"], "eu");
        assert!(!env.contains_key(ENV_DESCRIPTOR));
    }

    #[test]
    fn rollback_artifact_uses_previous_version() {
        let ctx = context(None);
        let artifact = ctx.artifact_for(&Version::new(1, 2, 2));
        assert_eq!(ctx.to_env(&artifact)[ENV_VERSION], "v1.2.2");
    }
}
