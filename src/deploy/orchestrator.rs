// ABOUTME: Drives one deployment run from lock acquisition to terminal state.
// ABOUTME: Applies rollback on failure and logs, audits, alerts, and records metrics for every outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Descriptor;
use crate::diagnostics::Warning;
use crate::error::{Error, ErrorKind};
use crate::lock::ScopeLock;
use crate::logging::{AuditTrail, current_actor, log_performance};
use crate::monitor::{MetricType, Monitor, Severity};
use crate::platform::Platform;
use crate::store::StateStore;
use crate::types::Environment;

use super::Deployment;
use super::request::DeploymentRequest;
use super::rollback::RollbackOutcome;
use super::run::{DeploymentRun, RunState, RunStatus};
use super::state::RollbackPoint;
use super::transitions::Collaborators;

/// How long terminal notifications may hold up process exit.
const MONITOR_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Orchestrator {
    descriptor: Descriptor,
    collaborators: Collaborators,
    monitor: Monitor,
    audit: Option<AuditTrail>,
}

impl Orchestrator {
    pub fn new(descriptor: Descriptor, platform: Arc<dyn Platform>, store: Arc<dyn StateStore>) -> Self {
        Self {
            descriptor,
            collaborators: Collaborators::new(platform, store),
            monitor: Monitor::disabled(),
            audit: None,
        }
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.collaborators.project_dir = dir.into();
        self
    }

    pub fn with_registry(mut self, registry: Option<String>) -> Self {
        self.collaborators.registry = registry;
        self
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Lock scope for deployments of this service to `environment`.
    pub fn scope(&self, environment: Environment) -> String {
        format!("{}-{}", self.descriptor.service, environment)
    }

    /// Execute `request` to a terminal state.
    ///
    /// Never returns early with an error: every failure is folded into the
    /// returned run, whose exit code is the process exit code.
    pub async fn run(&self, request: DeploymentRequest) -> DeploymentRun {
        let started = Instant::now();
        let mut run = DeploymentRun::new(request);

        tracing::info!(
            environment = %request.environment(),
            version = %request.version(),
            dry_run = request.dry_run(),
            "Starting deployment of {} {} to {}",
            self.descriptor.service,
            request.version(),
            request.environment()
        );
        self.audit(&mut run, "deploy.start", "started");

        let scope = self.scope(request.environment());
        match ScopeLock::acquire(Arc::clone(&self.collaborators.store), &scope) {
            Ok(lock) => {
                run.advance(RunState::LockAcquired);
                self.execute(&mut run).await;
                if let Err(e) = lock.release() {
                    run.warn(Warning::lock_release(format!(
                        "failed to release lock {scope}: {e}"
                    )));
                }
            }
            Err(e) => {
                tracing::error!(scope = %scope, "{e}");
                run.fail(&e);
            }
        }

        self.conclude(&mut run, started.elapsed()).await;
        run
    }

    async fn execute(&self, run: &mut DeploymentRun) {
        let c = &self.collaborators;
        let deployment = Deployment::new(run.request, self.descriptor.clone());

        let validated = match deployment.validate(c) {
            Ok(validated) => validated,
            Err(e) => {
                tracing::error!("Validation failed: {e}");
                return run.fail(&e);
            }
        };
        run.advance(RunState::Validated);

        if run.request.dry_run() {
            for action in validated.plan() {
                tracing::info!(dry_run = true, "Would {action}");
            }
            return run.succeed();
        }

        let built = match validated.build(c).await {
            Ok(built) => built,
            Err(e) => {
                tracing::error!("Build failed: {e}");
                return run.fail(&e);
            }
        };
        run.advance(RunState::Built);

        let deployed = match built.deploy(c).await {
            Ok(deployed) => deployed,
            Err((built, e)) => return self.recover(run, built, e).await,
        };
        run.advance(RunState::Deployed);

        let healthy = match deployed.health_check(c).await {
            Ok(healthy) => healthy,
            Err((deployed, e)) => return self.recover(run, deployed, e).await,
        };
        run.advance(RunState::Healthy);

        let completed = healthy.post_tasks(c, &mut run.warnings).await;
        run.advance(RunState::PostTasksDone);

        tracing::info!(
            artifact = %completed.artifact().reference,
            "{} {} is live in {}",
            completed.service_name(),
            completed.version(),
            completed.environment()
        );
        run.succeed();
    }

    /// Roll back after a failure past the start of the deploy step.
    async fn recover<S: RollbackPoint>(
        &self,
        run: &mut DeploymentRun,
        deployment: Deployment<S>,
        cause: Error,
    ) {
        tracing::error!(
            kind = %cause.kind(),
            "Deployment of {} {} to {} failed: {cause}",
            deployment.service_name(),
            deployment.version(),
            deployment.environment()
        );
        run.begin_rollback(&cause);

        match deployment.rollback(&self.collaborators).await {
            Ok(outcome) => {
                let result = match outcome {
                    RollbackOutcome::Reverted(version) => format!("reverted to {version}"),
                    RollbackOutcome::NothingToRevert => "nothing to revert".to_string(),
                };
                self.audit(run, "deploy.rollback", &result);
                run.rolled_back();
            }
            Err(e) => {
                crate::fatal!(
                    kind = %e.kind(),
                    "Rollback failed, {} may be left running a broken release: {e}",
                    run.request.environment()
                );
                self.audit(run, "deploy.rollback", "failed");
                run.fail(&e);
            }
        }
    }

    /// Log, audit, alert, and record metrics for a terminal run.
    async fn conclude(&self, run: &mut DeploymentRun, elapsed: Duration) {
        let request = run.request;
        let service = self.descriptor.service.to_string();
        let environment = request.environment().to_string();
        let version = request.version();
        let kind = run.exit_kind();
        let reason = run.error.clone().unwrap_or_default();

        let (severity, message) = match run.status {
            RunStatus::Succeeded if request.dry_run() => (
                Severity::Info,
                format!("Dry run of {service} {version} to {environment} passed validation"),
            ),
            RunStatus::Succeeded => (
                Severity::Info,
                format!("Deployed {service} {version} to {environment}"),
            ),
            RunStatus::RolledBack => (
                Severity::Warning,
                format!("Deployment of {service} {version} to {environment} rolled back: {reason}"),
            ),
            RunStatus::Failed | RunStatus::Running => {
                let severity = if kind == ErrorKind::RollbackFailed {
                    Severity::Fatal
                } else {
                    Severity::Error
                };
                (
                    severity,
                    format!("Deployment of {service} {version} to {environment} failed: {reason}"),
                )
            }
        };

        match run.status {
            RunStatus::Succeeded => tracing::info!(status = %run.status, "{message}"),
            RunStatus::RolledBack => tracing::warn!(status = %run.status, kind = %kind, "{message}"),
            RunStatus::Failed | RunStatus::Running => {
                tracing::error!(status = %run.status, kind = %kind, "{message}")
            }
        }

        let status = run.status.as_str();
        log_performance("deploy", elapsed, status);
        self.audit(run, "deploy.finish", status);

        let tags = [
            ("service", service.as_str()),
            ("environment", environment.as_str()),
            ("status", status),
        ];
        self.monitor.send_metric(
            "deployment.duration_seconds",
            elapsed.as_secs_f64(),
            MetricType::Histogram,
            &tags,
        );
        self.monitor
            .send_metric("deployment.count", 1.0, MetricType::Counter, &tags);
        if run.rollback_attempts > 0 {
            self.monitor.send_metric(
                "deployment.rollbacks",
                f64::from(run.rollback_attempts),
                MetricType::Counter,
                &tags,
            );
        }
        self.monitor.send_alert(severity, &message, "deploy");
        self.monitor.flush(MONITOR_FLUSH_TIMEOUT).await;
    }

    /// Record a run that was interrupted before reaching a terminal state.
    ///
    /// The run future has already been dropped, releasing its lock.
    pub async fn cancelled(&self, request: DeploymentRequest, signal: &str) -> ErrorKind {
        let error = Error::Cancelled(signal.to_string());
        let message = format!(
            "Deployment of {} {} to {} cancelled by {signal}",
            self.descriptor.service,
            request.version(),
            request.environment()
        );
        tracing::error!(kind = %error.kind(), "{message}");

        let mut run = DeploymentRun::new(request);
        run.fail(&error);
        self.audit(&mut run, "deploy.cancel", &format!("cancelled by {signal}"));

        self.monitor.send_alert(Severity::Error, &message, "deploy");
        self.monitor.flush(MONITOR_FLUSH_TIMEOUT).await;
        error.kind()
    }

    fn audit(&self, run: &mut DeploymentRun, action: &str, result: &str) {
        let Some(audit) = &self.audit else {
            return;
        };
        let resource = format!(
            "{}/{}@{}",
            self.descriptor.service,
            run.request.environment(),
            run.request.version()
        );
        if let Err(e) = audit.record(&current_actor(), action, &resource, result) {
            run.warn(Warning::audit_write(format!("failed to write audit entry: {e}")));
        }
    }
}
