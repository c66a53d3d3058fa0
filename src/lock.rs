// ABOUTME: Scope lock preventing two orchestrator runs against the same environment.
// ABOUTME: Atomic create-if-absent in the state store; released on drop so every exit path cleans up.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{self, StateStore};

/// Who holds a scope lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Scope the lock guards, e.g. `api-staging`.
    pub scope: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    /// Lock info for the current process.
    pub fn new(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            pid: std::process::id(),
            holder: local_host(),
            acquired_at: Utc::now(),
        }
    }

    /// A lock is stale once its owning process has exited.
    ///
    /// Only local pids can be checked, so a lock held from another host is
    /// never stale and must be cleared by hand.
    pub fn is_stale(&self) -> bool {
        self.holder == local_host() && !process_alive(self.pid)
    }

    /// Store key for a scope's lock record.
    pub fn key(scope: &str) -> String {
        format!("locks/{scope}.lock")
    }
}

fn local_host() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Whether a process with this pid is currently running on this host.
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    let proc_root = Path::new("/proc");
    if proc_root.join("self").exists() {
        return proc_root.join(pid.to_string()).exists();
    }

    // No procfs: `kill -0` probes for existence without delivering a signal
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn held_by(scope: &str, holder: LockInfo) -> Error {
    Error::LockHeld {
        scope: scope.to_string(),
        holder: holder.holder,
        pid: holder.pid,
        since: holder.acquired_at,
    }
}

/// Error for losing a race for the lock, naming the winner when it can be read.
fn contended(records: &dyn StateStore, scope: &str) -> Error {
    match store::load::<LockInfo>(records, &LockInfo::key(scope)) {
        Ok(Some(winner)) => held_by(scope, winner),
        _ => Error::Lock(format!("lock {scope} changed hands while acquiring it")),
    }
}

/// A held scope lock. Dropping it releases the lock.
pub struct ScopeLock {
    store: Arc<dyn StateStore>,
    info: LockInfo,
    released: bool,
}

impl std::fmt::Debug for ScopeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeLock")
            .field("scope", &self.info.scope)
            .field("pid", &self.info.pid)
            .finish()
    }
}

impl ScopeLock {
    /// Acquire the lock for `scope`.
    ///
    /// Fails with [`Error::LockHeld`] if a live process owns it. A record left by
    /// a dead process, or one that cannot be parsed, is reclaimed with a warning.
    /// Reclaiming replaces only the exact record judged stale, so of two
    /// processes reclaiming the same record at most one succeeds.
    pub fn acquire(store: Arc<dyn StateStore>, scope: &str) -> Result<Self> {
        let key = LockInfo::key(scope);
        let info = LockInfo::new(scope);
        let bytes = serde_json::to_vec(&info)
            .map_err(|e| Error::Lock(format!("failed to serialize lock: {e}")))?;

        if store.create(&key, &bytes)? {
            tracing::debug!(scope, pid = info.pid, "acquired deploy lock");
            return Ok(Self::held(store, info));
        }

        let Some(observed) = store.read(&key)? else {
            // Released between our create and read
            if store.create(&key, &bytes)? {
                tracing::debug!(scope, pid = info.pid, "acquired deploy lock");
                return Ok(Self::held(store, info));
            }
            return Err(contended(store.as_ref(), scope));
        };

        match serde_json::from_slice::<LockInfo>(&observed) {
            Ok(existing) if !existing.is_stale() => return Err(held_by(scope, existing)),
            Ok(existing) => {
                tracing::warn!(
                    scope,
                    stale_pid = existing.pid,
                    "Reclaiming stale lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.acquired_at
                );
            }
            Err(e) => {
                tracing::warn!(scope, "Lock record unreadable, breaking lock: {e}");
            }
        }

        if !store.replace_if(&key, &observed, &bytes)? {
            return Err(contended(store.as_ref(), scope));
        }

        tracing::debug!(scope, pid = info.pid, "acquired deploy lock");
        Ok(Self::held(store, info))
    }

    fn held(store: Arc<dyn StateStore>, info: LockInfo) -> Self {
        Self {
            store,
            info,
            released: false,
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn scope(&self) -> &str {
        &self.info.scope
    }

    /// Release the lock, reporting failure to delete the record.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.remove(&LockInfo::key(&self.info.scope))?;
        tracing::debug!(scope = %self.info.scope, "released deploy lock");
        Ok(())
    }
}

impl Drop for ScopeLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let key = LockInfo::key(&self.info.scope);
        match self.store.remove(&key) {
            Ok(()) => tracing::debug!(scope = %self.info.scope, "released deploy lock on drop"),
            Err(e) => tracing::warn!(scope = %self.info.scope, "failed to release deploy lock: {e}"),
        }
    }
}
