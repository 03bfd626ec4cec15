//! In-memory store

use std::collections::HashMap;
use std::sync::RwLock;

use super::{validate_key, KvStore, PersistenceError};

/// Volatile store, lost on drop
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        validate_key(key)?;
        let values = self.values.read().map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError> {
        validate_key(key)?;
        let mut values = self.values.write().map_err(|_| PersistenceError::LockPoisoned)?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
