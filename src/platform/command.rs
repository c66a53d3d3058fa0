// ABOUTME: Platform implementation backed by the deployment descriptor's shell commands.
// ABOUTME: Each step exports the run's SHIPWRIGHT_* variables to its command.

use async_trait::async_trait;

use super::{Artifact, CommandRunner, Platform, StepContext};
use crate::config::Descriptor;
use crate::error::Result;
use crate::types::Version;

/// Runs the descriptor's commands, with the target environment's overrides
/// applied per call.
#[derive(Debug, Clone)]
pub struct CommandPlatform {
    descriptor: Descriptor,
    runner: CommandRunner,
}

impl CommandPlatform {
    pub fn new(descriptor: Descriptor, runner: CommandRunner) -> Self {
        Self { descriptor, runner }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn commands(&self, ctx: &StepContext) -> Result<Descriptor> {
        self.descriptor.for_environment(ctx.environment)
    }
}

#[async_trait]
impl Platform for CommandPlatform {
    async fn build(&self, ctx: &StepContext) -> Result<Artifact> {
        let artifact = ctx.artifact();
        match &self.commands(ctx)?.build {
            Some(command) => {
                self.runner.run("build", command, &ctx.to_env(&artifact)).await?;
            }
            None => {
                tracing::debug!("No build command configured, using {}", artifact.reference);
            }
        }
        Ok(artifact)
    }

    async fn deploy(&self, ctx: &StepContext, artifact: &Artifact) -> Result<()> {
        let commands = self.commands(ctx)?;
        self.runner
            .run("deploy", &commands.deploy, &ctx.to_env(artifact))
            .await?;
        Ok(())
    }

    async fn probe(&self, ctx: &StepContext) -> Result<()> {
        let commands = self.commands(ctx)?;
        let Some(health) = &commands.health else {
            return Ok(());
        };
        self.runner
            .run("health", &health.cmd, &ctx.to_env(&ctx.artifact()))
            .await?;
        Ok(())
    }

    async fn rollback(&self, ctx: &StepContext, version: &Version) -> Result<()> {
        let artifact = ctx.artifact_for(version);
        let commands = self.commands(ctx)?;
        self.runner
            .run(
                "rollback",
                commands.rollback_command(),
                &ctx.to_env(&artifact),
            )
            .await?;
        Ok(())
    }

    async fn post_task(&self, ctx: &StepContext, task: &str) -> Result<()> {
        self.runner
            .run("post-deploy", task, &ctx.to_env(&ctx.artifact()))
            .await?;
        Ok(())
    }
}
