// ABOUTME: In-process state store for tests and embedding.
// ABOUTME: A mutex-guarded map gives the same atomicity guarantees as the file store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{StateStore, StoreError, check_key};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        check_key(key)?;
        Ok(self.records.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        check_key(key)?;
        self.records.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn create(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        check_key(key)?;
        let mut records = self.records.lock();
        if records.contains_key(key) {
            return Ok(false);
        }
        records.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.records.lock().remove(key);
        Ok(())
    }

    fn replace_if(&self, key: &str, expected: &[u8], value: &[u8]) -> Result<bool, StoreError> {
        check_key(key)?;
        let mut records = self.records.lock();
        match records.get_mut(key) {
            Some(current) if current.as_slice() == expected => {
                *current = value.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
