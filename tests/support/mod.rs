// ABOUTME: Shared test fixtures: a scriptable fake platform, descriptors, and log capture.
// ABOUTME: Lets orchestrator tests run entirely in-process against a MemoryStore.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shipwright::config::Descriptor;
use shipwright::deploy::Orchestrator;
use shipwright::error::{Error, Result};
use shipwright::logging::{self, LogConfig, LogEntry, LogGuard, LogLevel, error_file, journal_file};
use shipwright::platform::{Artifact, Platform, StepContext};
use shipwright::store::MemoryStore;
use shipwright::types::Version;
use tempfile::TempDir;

/// Failure budget meaning "fail on every call".
pub const ALWAYS: u32 = u32::MAX;

/// Descriptor with zero retry delays and three quick health probes.
pub const BASE_DESCRIPTOR: &str = r#"
service: api
build: ./build.sh
deploy: ./deploy.sh
rollback: ./rollback.sh
post_deploy:
  - ./purge-cache.sh
health:
  cmd: ./probe.sh
  attempts: 3
  interval: 1s
  timeout: 1s
retry:
  build: { max_attempts: 3, initial_delay: 0s }
  deploy: { max_attempts: 3, initial_delay: 0s }
  rollback: { max_attempts: 2, initial_delay: 0s }
timeouts:
  deploy: 2s
environments:
  dev: {}
  staging: {}
  production: {}
"#;

pub fn descriptor() -> Descriptor {
    Descriptor::from_yaml(BASE_DESCRIPTOR).expect("base descriptor should parse")
}

/// Platform whose steps fail a configurable number of times.
#[derive(Default)]
pub struct FakePlatform {
    build_failures: AtomicU32,
    deploy_failures: AtomicU32,
    probe_failures: AtomicU32,
    rollback_failures: AtomicU32,
    deploy_hangs: AtomicBool,
    failing_tasks: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_build(self, times: u32) -> Self {
        self.build_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_deploy(self, times: u32) -> Self {
        self.deploy_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_probe(self, times: u32) -> Self {
        self.probe_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_rollback(self, times: u32) -> Self {
        self.rollback_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn hanging_deploy(self) -> Self {
        self.deploy_hangs.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_task(self, task: &str) -> Self {
        self.failing_tasks.lock().push(task.to_string());
        self
    }

    /// Every call made, in order, e.g. `deploy api:v1.2.3`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of calls whose description starts with `step`.
    pub fn count(&self, step: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(step)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

/// Consume one failure from `budget`. `ALWAYS` is never used up.
fn should_fail(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 => None,
            ALWAYS => Some(ALWAYS),
            n => Some(n - 1),
        })
        .is_ok()
}

fn failure(step: &str) -> Error {
    Error::CommandFailed {
        command: format!("./{step}.sh"),
        status: "exit code 1".to_string(),
        stderr: format!("{step} failed"),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn build(&self, ctx: &StepContext) -> Result<Artifact> {
        self.record(format!("build {}", ctx.version));
        if should_fail(&self.build_failures) {
            return Err(failure("build"));
        }
        Ok(ctx.artifact())
    }

    async fn deploy(&self, _ctx: &StepContext, artifact: &Artifact) -> Result<()> {
        self.record(format!("deploy {}", artifact.reference));
        if self.deploy_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if should_fail(&self.deploy_failures) {
            return Err(failure("deploy"));
        }
        Ok(())
    }

    async fn probe(&self, _ctx: &StepContext) -> Result<()> {
        self.record("probe".to_string());
        if should_fail(&self.probe_failures) {
            return Err(failure("probe"));
        }
        Ok(())
    }

    async fn rollback(&self, _ctx: &StepContext, version: &Version) -> Result<()> {
        self.record(format!("rollback {version}"));
        if should_fail(&self.rollback_failures) {
            return Err(failure("rollback"));
        }
        Ok(())
    }

    async fn post_task(&self, _ctx: &StepContext, task: &str) -> Result<()> {
        self.record(format!("post {task}"));
        if self.failing_tasks.lock().iter().any(|t| t == task) {
            return Err(failure("post-task"));
        }
        Ok(())
    }
}

/// An orchestrator over `platform` with an in-memory store.
pub fn orchestrator(platform: &Arc<FakePlatform>, store: &Arc<MemoryStore>) -> Orchestrator {
    Orchestrator::new(descriptor(), platform.clone(), store.clone())
}

/// Journal capture for the current thread.
pub struct CapturedLogs {
    dir: TempDir,
    guard: LogGuard,
    _default: tracing::subscriber::DefaultGuard,
}

impl CapturedLogs {
    pub fn start(level: LogLevel) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = LogConfig::new(level).with_dir(dir.path()).without_console();
        let (subscriber, guard) = logging::subscriber(&config).expect("subscriber");
        let default = tracing::subscriber::set_default(subscriber);
        Self {
            dir,
            guard,
            _default: default,
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.guard.flush();
        read_entries(&journal_file(self.dir.path(), Utc::now().date_naive()))
    }

    pub fn error_entries(&self) -> Vec<LogEntry> {
        self.guard.flush();
        read_entries(&error_file(self.dir.path(), Utc::now().date_naive()))
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }
}

pub fn read_entries(path: &std::path::Path) -> Vec<LogEntry> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("journal line should be a LogEntry"))
        .collect()
}
