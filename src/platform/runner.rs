// ABOUTME: Runs descriptor commands through `sh -c` with the step's variables exported.
// ABOUTME: Each command runs in its own process group, killed whole when the future is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Captured output of a successful command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct CommandRunner {
    working_dir: PathBuf,
    shell: String,
}

impl CommandRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            shell: "sh".to_string(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Run `command`, failing with [`Error::CommandFailed`] on a non-zero exit.
    pub async fn run(
        &self,
        label: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<CommandOutput> {
        tracing::debug!(step = label, command, "running command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // kill_on_drop only reaches the shell; the group takes its descendants too
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let group = GroupKill::new(child.id());
        let output = child.wait_with_output().await?;
        if output.status.success() {
            group.disarm();
        } else {
            drop(group);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "signal".to_string(),
            };
            return Err(Error::CommandFailed {
                command: command.to_string(),
                status,
                stderr: last_line(&stderr),
            });
        }

        if !stdout.is_empty() {
            tracing::debug!(step = label, "{stdout}");
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

/// Kills a child's whole process group when dropped, unless disarmed.
///
/// A timed-out or failed attempt must not leave work running that would race
/// the next attempt or a rollback.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    // A negative pid addresses every process in the group
    let killed = std::process::Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pgid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = killed {
        tracing::warn!(pgid, "failed to kill process group: {e}");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// The last non-empty line; usually the one that explains the failure.
fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .to_string()
}
