// ABOUTME: Append-only audit trail of security and operationally significant actions.
// ABOUTME: Written independently of the log level so entries are never suppressed.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::journal::audit_file;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub result: String,
}

/// The user and host on whose behalf the orchestrator runs.
pub fn current_actor() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    format!("{user}@{host}")
}

pub struct AuditTrail {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditTrail {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one entry to today's audit file.
    pub fn record(
        &self,
        actor: &str,
        action: &str,
        resource: &str,
        result: &str,
    ) -> io::Result<AuditEntry> {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            result: result.to_string(),
        };

        let mut line = serde_json::to_string(&entry).map_err(io::Error::other)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(audit_file(&self.dir, entry.timestamp.date_naive()))?;
        file.write_all(line.as_bytes())?;

        Ok(entry)
    }

    /// All entries recorded on `date`.
    pub fn entries(&self, date: NaiveDate) -> io::Result<Vec<AuditEntry>> {
        let content = match fs::read_to_string(audit_file(&self.dir, date)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(io::Error::other))
            .collect()
    }
}
