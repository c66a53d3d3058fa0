// ABOUTME: Integration tests for the scope lock.
// ABOUTME: Tests mutual exclusion, stale lock reclamation, and release on drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use shipwright::error::{Error, ErrorKind};
use shipwright::lock::{LockInfo, ScopeLock};
use shipwright::store::{self, FileStore, StateStore, StoreError};

/// A lock record from this host whose process no longer exists.
fn dead_lock(scope: &str) -> LockInfo {
    LockInfo {
        // Above any Linux pid_max
        pid: 4_000_000_000,
        acquired_at: Utc::now() - chrono::Duration::minutes(5),
        ..LockInfo::new(scope)
    }
}

fn file_store() -> (tempfile::TempDir, Arc<dyn StateStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StateStore> = Arc::new(FileStore::new(dir.path()));
    (dir, store)
}

/// Test: Second acquisition while the first is held fails with holder details.
#[test]
fn held_lock_rejects_second_acquire() {
    let (_dir, store) = file_store();

    let lock = ScopeLock::acquire(Arc::clone(&store), "api-staging").expect("first lock");

    let err = ScopeLock::acquire(Arc::clone(&store), "api-staging").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockHeld);
    match err {
        Error::LockHeld { scope, pid, holder, .. } => {
            assert_eq!(scope, "api-staging");
            assert_eq!(pid, std::process::id());
            assert!(!holder.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }

    lock.release().expect("release");
    let again = ScopeLock::acquire(store, "api-staging").expect("lock after release");
    again.release().unwrap();
}

/// Test: Lock file lands at locks/<scope>.lock with the owner's details.
#[test]
fn lock_record_is_written_to_state_dir() {
    let (dir, store) = file_store();

    let lock = ScopeLock::acquire(store, "api-dev").unwrap();
    let path = dir.path().join("locks/api-dev.lock");
    let info: LockInfo = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(info.pid, std::process::id());
    assert_eq!(&info, lock.info());

    drop(lock);
    assert!(!path.exists(), "dropping the guard releases the lock");
}

/// Test: A lock left by a dead process is reclaimed.
#[test]
fn stale_lock_is_reclaimed() {
    let (_dir, store) = file_store();
    let key = LockInfo::key("api-production");
    let stale = dead_lock("api-production");
    store::save(store.as_ref(), &key, &stale).unwrap();
    assert!(stale.is_stale());

    let lock = ScopeLock::acquire(Arc::clone(&store), "api-production").expect("reclaimed");
    assert_eq!(lock.info().pid, std::process::id());

    let current: LockInfo = store::load(store.as_ref(), &key).unwrap().unwrap();
    assert_eq!(current.pid, std::process::id());
}

/// Test: An unreadable lock record is broken rather than blocking forever.
#[test]
fn corrupt_lock_is_reclaimed() {
    let (_dir, store) = file_store();
    let key = LockInfo::key("api-dev");
    store.write(&key, b"not json").unwrap();

    let lock = ScopeLock::acquire(Arc::clone(&store), "api-dev").expect("reclaimed");
    lock.release().unwrap();
    assert!(store.read(&key).unwrap().is_none());
}

/// Test: Different scopes do not contend.
#[test]
fn scopes_are_independent() {
    let (_dir, store) = file_store();
    let a = ScopeLock::acquire(Arc::clone(&store), "api-dev").unwrap();
    let b = ScopeLock::acquire(Arc::clone(&store), "api-staging").unwrap();
    assert_ne!(a.scope(), b.scope());
}

/// Test: Concurrent acquirers race and exactly one wins.
#[test]
fn concurrent_acquire_has_single_winner() {
    let (_dir, store) = file_store();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                s.spawn(move || ScopeLock::acquire(store, "api-race"))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::LockHeld)
    );
}

/// Test: A lock from another host is not judged by the local pid table.
#[test]
fn foreign_host_lock_is_not_reclaimed() {
    let (_dir, store) = file_store();
    let key = LockInfo::key("api-production");
    let remote = LockInfo {
        holder: "build-agent-7.internal".to_string(),
        ..dead_lock("api-production")
    };
    store::save(store.as_ref(), &key, &remote).unwrap();

    let err = ScopeLock::acquire(Arc::clone(&store), "api-production").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockHeld);

    let current: LockInfo = store::load(store.as_ref(), &key).unwrap().unwrap();
    assert_eq!(current, remote);
}

/// Store wrapper that lets a rival process reclaim the lock just before our
/// first conditional replace, as if both had read the same stale record.
struct RivalReclaims {
    inner: Arc<dyn StateStore>,
    scope: String,
    fired: AtomicBool,
    rival: Mutex<Option<ScopeLock>>,
}

impl StateStore for RivalReclaims {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner.write(key, value)
    }

    fn create(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        self.inner.create(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }

    fn replace_if(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let rival = ScopeLock::acquire(Arc::clone(&self.inner), &self.scope)
                .expect("rival reclaims the stale lock");
            *self.rival.lock() = Some(rival);
        }
        self.inner.replace_if(key, expected, value)
    }
}

/// Test: Two reclaimers of the same stale record never both hold the lock.
#[test]
fn racing_reclaimers_leave_one_holder() {
    let (_dir, inner) = file_store();
    let key = LockInfo::key("api-production");
    store::save(inner.as_ref(), &key, &dead_lock("api-production")).unwrap();

    let racing = Arc::new(RivalReclaims {
        inner: Arc::clone(&inner),
        scope: "api-production".to_string(),
        fired: AtomicBool::new(false),
        rival: Mutex::new(None),
    });

    let err = ScopeLock::acquire(racing.clone(), "api-production").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockHeld);

    let rival = racing.rival.lock().take().expect("rival holds the lock");
    let current: LockInfo = store::load(inner.as_ref(), &key).unwrap().unwrap();
    assert_eq!(&current, rival.info());

    rival.release().unwrap();
    assert!(inner.read(&key).unwrap().is_none());
}
