// ABOUTME: Console feedback for CLI runs.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;

use crate::deploy::{DeploymentRun, RunStatus};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly summary with warnings
    Normal,
    /// Only the final result line
    Quiet,
    /// One JSON object per event, for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print an error that ended the run before it started.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => emit_stderr(&JsonEvent {
                event: "error",
                message,
                run: None,
            }),
        }
    }

    /// Print the outcome of a finished run.
    pub fn report(&self, run: &DeploymentRun) {
        let message = summary(run);

        match self.mode {
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "finished",
                    message: &message,
                    run: Some(run),
                };
                if run.status == RunStatus::Succeeded {
                    emit_stdout(&event);
                } else {
                    emit_stderr(&event);
                }
            }
            OutputMode::Normal | OutputMode::Quiet => {
                if self.mode == OutputMode::Normal {
                    for warning in run.warnings.warnings() {
                        eprintln!("Warning: {}", warning.message);
                    }
                }
                match run.status {
                    RunStatus::Succeeded => println!("{message}"),
                    _ => eprintln!("Error: {message}"),
                }
            }
        }
    }
}

fn summary(run: &DeploymentRun) -> String {
    let request = &run.request;
    let elapsed = run
        .ended_at
        .map(|end| (end - run.started_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();
    let reason = run.error.as_deref().unwrap_or("unknown error");

    match run.status {
        RunStatus::Succeeded if request.dry_run() => format!(
            "Dry run of {} to {} passed ({elapsed:.1}s)",
            request.version(),
            request.environment()
        ),
        RunStatus::Succeeded => format!(
            "Deployed {} to {} ({elapsed:.1}s)",
            request.version(),
            request.environment()
        ),
        RunStatus::RolledBack => format!(
            "Deployment of {} to {} rolled back: {reason}",
            request.version(),
            request.environment()
        ),
        RunStatus::Failed | RunStatus::Running => format!(
            "Deployment of {} to {} failed: {reason}",
            request.version(),
            request.environment()
        ),
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<&'a DeploymentRun>,
}

fn emit_stdout(event: &JsonEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

fn emit_stderr(event: &JsonEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        eprintln!("{json}");
    }
}
