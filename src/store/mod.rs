// ABOUTME: Durable key/value state store shared by the lock manager and circuit breakers.
// ABOUTME: Writes replace whole records atomically; creation and conditional replace never clobber.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};

/// Errors raised by state store backends.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    #[snafu(display("invalid state key '{key}'"))]
    InvalidKey { key: String },

    #[snafu(display("failed to read {key}: {source}"))]
    Read { key: String, source: std::io::Error },

    #[snafu(display("failed to write {key}: {source}"))]
    Write { key: String, source: std::io::Error },

    #[snafu(display("failed to remove {key}: {source}"))]
    Remove { key: String, source: std::io::Error },

    #[snafu(display("record {key} is corrupt: {source}"))]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    #[snafu(display("failed to encode {key}: {source}"))]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// Durable store for the orchestrator's shared mutable state.
///
/// Keys are slash-separated relative names such as `locks/api-staging.lock`.
/// Implementations must make `write` an atomic replace and `create` an atomic
/// create-if-absent, so concurrent processes never observe a half-written record.
pub trait StateStore: Send + Sync {
    /// Read a record, or `None` if it does not exist.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically replace a record.
    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Atomically create a record. Returns `false` if it already exists.
    fn create(&self, key: &str, value: &[u8]) -> Result<bool, StoreError>;

    /// Remove a record. Removing a missing record succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically replace a record only if it still holds exactly `expected`.
    ///
    /// Returns `false`, leaving the record untouched, if it changed or vanished.
    /// Concurrent callers racing on the same `expected` value see one winner.
    fn replace_if(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError>;
}

/// Read and decode a JSON record.
pub fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.read(key)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .context(DecodeSnafu { key }),
        None => Ok(None),
    }
}

/// Encode and atomically write a JSON record.
pub fn save<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).context(EncodeSnafu { key })?;
    store.write(key, &bytes)
}

/// Reject keys that could escape the store root.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..");
    if valid {
        Ok(())
    } else {
        InvalidKeySnafu { key }.fail()
    }
}
