// ABOUTME: Filesystem-backed state store rooted at the configured state directory.
// ABOUTME: Uses write-temp-then-rename for replaces, hard links for exclusive creation, and flock for CAS.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::ResultExt;

use super::{
    ReadSnafu, RemoveSnafu, StateStore, StoreError, WriteSnafu, check_key,
};

// Distinguishes temp files written concurrently by threads of one process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path backing a key.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    /// Write `value` to a private temp file next to `path`, synced to disk.
    fn write_temp(path: &Path, value: &[u8]) -> io::Result<PathBuf> {
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = parent.join(format!(".{}.{}.{}.tmp", name, std::process::id(), seq));

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(value)?;
        file.sync_all()?;
        Ok(tmp_path)
    }

    /// Exclusive advisory lock serializing conditional replaces of `path`.
    ///
    /// The lock lives on a sidecar file so the record itself can be renamed over.
    /// It is released when the returned handle drops, or when the process dies.
    fn lock_sidecar(path: &Path) -> io::Result<File> {
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sidecar = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(parent.join(format!(".{name}.cas")))?;
        sidecar.lock()?;
        Ok(sidecar)
    }

    fn sync_parent(path: &Path) {
        // Directory fsync makes the rename durable; failure only weakens crash safety
        if let Some(parent) = path.parent()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }
    }
}

impl StateStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(ReadSnafu { key }),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp_path = Self::write_temp(&path, value).context(WriteSnafu { key })?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).context(WriteSnafu { key });
        }
        Self::sync_parent(&path);
        Ok(())
    }

    fn create(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        let tmp_path = Self::write_temp(&path, value).context(WriteSnafu { key })?;

        // link(2) fails if the target exists, and the linked file is already complete
        let linked = fs::hard_link(&tmp_path, &path);
        let _ = fs::remove_file(&tmp_path);

        match linked {
            Ok(()) => {
                Self::sync_parent(&path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).context(WriteSnafu { key }),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(RemoveSnafu { key }),
        }
    }

    fn replace_if(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        let _serialized = Self::lock_sidecar(&path).context(WriteSnafu { key })?;

        match fs::read(&path) {
            Ok(current) if current == expected => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context(ReadSnafu { key }),
        }

        // Rename replaces in place, so the record never disappears and a racing
        // create cannot slip in between
        let tmp_path = Self::write_temp(&path, value).context(WriteSnafu { key })?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).context(WriteSnafu { key });
        }
        Self::sync_parent(&path);
        Ok(true)
    }
}
