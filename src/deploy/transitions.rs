// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::resolve_env_map;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::logging::current_actor;
use crate::platform::{Platform, StepContext};
use crate::resilience::{BreakerConfig, BreakerError, CircuitBreaker, RetryPolicy, retry};
use crate::store::StateStore;

use super::Deployment;
use super::release::{self, ReleaseRecord};
use super::state::{Built, Completed, Deployed, Healthy, Locked, Validated};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = std::result::Result<Deployment<T>, (Deployment<S>, Error)>;

/// Circuit breaker guarding the artifact registry during builds.
pub const BUILD_BREAKER: &str = "build-registry";
/// Circuit breaker guarding the deployment target.
pub const DEPLOY_BREAKER: &str = "deploy-target";

/// What the transitions act on.
#[derive(Clone)]
pub struct Collaborators {
    pub platform: Arc<dyn Platform>,
    pub store: Arc<dyn StateStore>,
    /// Directory relative paths in the descriptor resolve against.
    pub project_dir: PathBuf,
    pub registry: Option<String>,
}

impl Collaborators {
    pub fn new(platform: Arc<dyn Platform>, store: Arc<dyn StateStore>) -> Self {
        Self {
            platform,
            store,
            project_dir: PathBuf::from("."),
            registry: None,
        }
    }

    pub fn breaker(&self, name: &str, config: BreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(name, config, Arc::clone(&self.store))
    }
}

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    /// Move to the next state, carrying the request and descriptor along.
    pub(crate) fn transition<T>(self, next: impl FnOnce(S) -> T) -> Deployment<T> {
        Deployment {
            request: self.request,
            descriptor: self.descriptor,
            state: next(self.state),
        }
    }
}

/// Bound one attempt by `limit`. Dropping the attempt cancels it.
pub(crate) async fn within<T, F, Fut>(operation: &str, limit: Duration, attempt: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, attempt()).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            after: limit,
        }),
    }
}

/// Run a step through the retry engine, with each attempt time-limited and,
/// when a breaker is given, routed through it.
pub(crate) async fn run_step<T, F, Fut>(
    step: &str,
    policy: &RetryPolicy,
    breaker: Option<&CircuitBreaker>,
    limit: Duration,
    operation: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let operation = &operation;
    retry(policy, step, move |attempt| async move {
        let bounded = within(step, limit, || operation(attempt));
        match breaker {
            Some(breaker) => breaker.call(|| bounded).await.map_err(from_breaker),
            None => bounded.await,
        }
    })
    .await
    .map_err(|exhausted| Error::exhausted(step, exhausted.attempts, exhausted.last_error))
}

fn from_breaker(error: BreakerError<Error>) -> Error {
    match error {
        BreakerError::Open { name, retry_after } => Error::CircuitOpen { name, retry_after },
        BreakerError::Inner(error) => error,
        BreakerError::Store(error) => Error::Store(error),
    }
}

// =============================================================================
// Locked -> Validated
// =============================================================================

impl Deployment<Locked> {
    /// Check the request against the descriptor and resolve the step context.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error if the environment is not declared,
    /// its descriptor file is missing, or a referenced variable is unset.
    pub fn validate(self, collaborators: &Collaborators) -> Result<Deployment<Validated>> {
        let environment = self.request.environment();
        let descriptor = self.descriptor.for_environment(environment)?;

        let descriptor_path = descriptor
            .environment(environment)
            .and_then(|env| env.descriptor.as_ref())
            .map(|path| collaborators.project_dir.join(path));
        if let Some(path) = &descriptor_path
            && !path.is_file()
        {
            return Err(Error::DescriptorMissing(path.clone()));
        }

        let env = resolve_env_map(&descriptor.env)?;
        let previous = release::current(collaborators.store.as_ref(), environment)?;

        let context = StepContext {
            environment,
            version: self.request.version(),
            service: descriptor.service.clone(),
            registry: collaborators.registry.clone(),
            descriptor: descriptor_path,
            previous_version: previous.map(|r| r.version),
            env,
            project_dir: collaborators.project_dir.clone(),
        };

        tracing::info!(
            environment = %environment,
            version = %context.version,
            previous = ?context.previous_version.map(|v| v.to_string()),
            "Validated deployment of {} {} to {}",
            context.service,
            context.version,
            environment
        );

        Ok(Deployment {
            request: self.request,
            descriptor,
            state: Validated { context },
        })
    }
}

// =============================================================================
// Validated -> Built
// =============================================================================

impl Deployment<Validated> {
    /// The actions a real run would take, in order.
    pub fn plan(&self) -> Vec<String> {
        let ctx = &self.state.context;
        let artifact = ctx.artifact();
        let descriptor = &self.descriptor;
        let mut actions = Vec::new();

        actions.push(match &descriptor.build {
            Some(cmd) => format!("build {} with `{cmd}`", artifact.reference),
            None => format!("use existing artifact {}", artifact.reference),
        });
        actions.push(format!(
            "deploy {} to {} with `{}`",
            artifact.reference, ctx.environment, descriptor.deploy
        ));
        actions.push(match &descriptor.health {
            Some(health) => format!(
                "probe readiness with `{}` up to {} time(s) every {:?}",
                health.cmd, health.attempts, health.interval
            ),
            None => "skip health check (none configured)".to_string(),
        });
        actions.push(format!(
            "record {} as the active release of {}",
            ctx.version, ctx.environment
        ));
        for task in &descriptor.post_deploy {
            actions.push(format!("run post-deploy task `{task}`"));
        }
        actions.push(match ctx.previous_version {
            Some(previous) => format!(
                "on failure, roll back to {previous} with `{}`",
                descriptor.rollback_command()
            ),
            None => "on failure, nothing to roll back to".to_string(),
        });

        actions
    }

    /// Produce the artifact through the `build-registry` breaker.
    ///
    /// Nothing has been deployed yet, so failure needs no rollback.
    #[must_use = "deployment state must be used"]
    pub async fn build(self, collaborators: &Collaborators) -> Result<Deployment<Built>> {
        let breaker = collaborators.breaker(BUILD_BREAKER, self.descriptor.breaker);
        let platform = collaborators.platform.as_ref();
        let ctx = &self.state.context;

        let artifact = run_step(
            "build",
            &self.descriptor.retry.build,
            Some(&breaker),
            self.descriptor.timeouts.build,
            move |_| async move { platform.build(ctx).await },
        )
        .await?;

        tracing::info!(artifact = %artifact.reference, "Built {}", artifact.reference);
        Ok(self.transition(|Validated { context }| Built { context, artifact }))
    }
}

// =============================================================================
// Built -> Deployed
// =============================================================================

impl Deployment<Built> {
    /// Activate the artifact through the `deploy-target` breaker.
    ///
    /// On failure the deployment is handed back so the caller can roll back.
    pub async fn deploy(self, collaborators: &Collaborators) -> TransitionResult<Deployed, Built> {
        let breaker = collaborators.breaker(DEPLOY_BREAKER, self.descriptor.breaker);
        let platform = collaborators.platform.as_ref();
        let ctx = &self.state.context;
        let artifact = &self.state.artifact;

        let outcome = run_step(
            "deploy",
            &self.descriptor.retry.deploy,
            Some(&breaker),
            self.descriptor.timeouts.deploy,
            move |_| async move { platform.deploy(ctx, artifact).await },
        )
        .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    artifact = %self.state.artifact.reference,
                    "Deployed {} to {}",
                    self.state.artifact.reference,
                    self.state.context.environment
                );
                Ok(self.transition(|Built { context, artifact }| Deployed { context, artifact }))
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// Deployed -> Healthy
// =============================================================================

impl Deployment<Deployed> {
    /// Probe readiness a fixed number of times at a fixed interval.
    pub async fn health_check(
        self,
        collaborators: &Collaborators,
    ) -> TransitionResult<Healthy, Deployed> {
        let probed = self.probe_until_ready(collaborators).await;
        match probed {
            Ok(()) => Ok(self.transition(|Deployed { context, artifact }| Healthy { context, artifact })),
            Err(e) => Err((self, e)),
        }
    }

    async fn probe_until_ready(&self, collaborators: &Collaborators) -> Result<()> {
        let Some(health) = &self.descriptor.health else {
            tracing::info!("No health check configured, skipping");
            return Ok(());
        };

        if !health.start_period.is_zero() {
            tracing::debug!("Waiting {:?} before the first probe", health.start_period);
            tokio::time::sleep(health.start_period).await;
        }

        let ctx = &self.state.context;
        let mut last_error = None;
        for attempt in 1..=health.attempts {
            let probe = within("health probe", health.timeout, || collaborators.platform.probe(ctx)).await;
            match probe {
                Ok(()) => {
                    tracing::info!(
                        attempt,
                        "Health check passed on probe {attempt}/{}",
                        health.attempts
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::info!(attempt, "Health probe {attempt}/{} failed: {e}", health.attempts);
                    last_error = Some(e);
                }
            }
            if attempt < health.attempts {
                tokio::time::sleep(health.interval).await;
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(Error::HealthCheckFailed(format!(
            "not ready after {} probe(s): {reason}",
            health.attempts
        )))
    }
}

// =============================================================================
// Healthy -> Completed
// =============================================================================

impl Deployment<Healthy> {
    /// Record the release and run post-deploy tasks.
    ///
    /// The new version is live at this point, so failures here are warnings.
    pub async fn post_tasks(
        self,
        collaborators: &Collaborators,
        diagnostics: &mut Diagnostics,
    ) -> Deployment<Completed> {
        let ctx = &self.state.context;

        let record = ReleaseRecord::new(ctx.environment, ctx.version, current_actor());
        if let Err(e) = release::record(collaborators.store.as_ref(), &record) {
            diagnostics.warn(Warning::release_record(format!(
                "failed to record release {}: {e}",
                ctx.version
            )));
        }

        for task in &self.descriptor.post_deploy {
            let outcome = within("post-deploy task", self.descriptor.timeouts.post_task, || {
                collaborators.platform.post_task(ctx, task)
            })
            .await;
            match outcome {
                Ok(()) => tracing::info!(task = task.as_str(), "Post-deploy task finished"),
                Err(e) => diagnostics.warn(Warning::post_task(format!(
                    "post-deploy task `{task}` failed: {e}"
                ))),
            }
        }

        self.transition(|Healthy { context, artifact }| Completed { context, artifact })
    }
}
