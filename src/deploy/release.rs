// ABOUTME: Records of which version is active in each environment.
// ABOUTME: The current release is what rollback reapplies; a bounded history is kept alongside.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{self, StateStore, StoreError};
use crate::types::{Environment, Version};

/// Entries kept in an environment's release history.
pub const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub version: Version,
    pub environment: Environment,
    pub deployed_at: DateTime<Utc>,
    pub actor: String,
}

impl ReleaseRecord {
    pub fn new(environment: Environment, version: Version, actor: impl Into<String>) -> Self {
        Self {
            version,
            environment,
            deployed_at: Utc::now(),
            actor: actor.into(),
        }
    }
}

pub fn current_key(environment: Environment) -> String {
    format!("releases/{environment}.json")
}

pub fn history_key(environment: Environment) -> String {
    format!("history/{environment}.json")
}

/// The release currently active in `environment`, if any was recorded.
pub fn current(
    store: &dyn StateStore,
    environment: Environment,
) -> Result<Option<ReleaseRecord>, StoreError> {
    store::load(store, &current_key(environment))
}

/// Most recent first.
pub fn history(
    store: &dyn StateStore,
    environment: Environment,
) -> Result<Vec<ReleaseRecord>, StoreError> {
    Ok(store::load(store, &history_key(environment))?.unwrap_or_default())
}

/// Make `record` the current release and prepend it to the history.
pub fn record(store: &dyn StateStore, record: &ReleaseRecord) -> Result<(), StoreError> {
    store::save(store, &current_key(record.environment), record)?;

    let mut entries = history(store, record.environment)?;
    entries.insert(0, record.clone());
    entries.truncate(HISTORY_LIMIT);
    store::save(store, &history_key(record.environment), &entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn no_release_recorded_initially() {
        let store = MemoryStore::default();
        assert_eq!(current(&store, Environment::Dev).unwrap(), None);
        assert!(history(&store, Environment::Dev).unwrap().is_empty());
    }

    #[test]
    fn recording_replaces_current_and_prepends_history() {
        let store = MemoryStore::default();
        record(&store, &ReleaseRecord::new(Environment::Dev, Version::new(1, 0, 0), "ci")).unwrap();
        record(&store, &ReleaseRecord::new(Environment::Dev, Version::new(1, 1, 0), "ci")).unwrap();

        let active = current(&store, Environment::Dev).unwrap().unwrap();
        assert_eq!(active.version, Version::new(1, 1, 0));

        let versions: Vec<_> = history(&store, Environment::Dev)
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![Version::new(1, 1, 0), Version::new(1, 0, 0)]);
        assert!(current(&store, Environment::Staging).unwrap().is_none());
    }

    #[test]
    fn history_is_bounded() {
        let store = MemoryStore::default();
        for patch in 0..(HISTORY_LIMIT as u64 + 5) {
            let entry = ReleaseRecord::new(Environment::Staging, Version::new(1, 0, patch), "ci");
            record(&store, &entry).unwrap();
        }
        let entries = history(&store, Environment::Staging).unwrap();
        assert_eq!(entries.len(), HISTORY_LIMIT);
        assert_eq!(entries[0].version, Version::new(1, 0, HISTORY_LIMIT as u64 + 4));
    }
}
