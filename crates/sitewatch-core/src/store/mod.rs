//! Key-value persistence
//!
//! Fingerprints, cached bodies, the incident log, alert dedup state and the
//! cycle history all live in a [`KvStore`] keyed by logical name. The durable
//! implementation is [`FileStore`]; [`MemoryStore`] backs tests and dry runs.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Persistence failures
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key contains characters or segments the store refuses
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Internal lock was poisoned by a panicking writer
    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

/// Byte-oriented key-value store
pub trait KvStore: Send + Sync {
    /// Read the value for a key, `None` when absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Write (replace) the value for a key
    fn put(&self, key: &str, value: &[u8]) -> Result<(), PersistenceError>;
}

/// Read and decode a JSON value
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, PersistenceError> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub fn put_json<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.put(key, &bytes)
}

/// Validate a store key: `/`-separated segments of `[A-Za-z0-9_.-]`
pub fn validate_key(key: &str) -> Result<(), PersistenceError> {
    if key.is_empty() {
        return Err(PersistenceError::InvalidKey("empty key".to_string()));
    }

    for segment in key.split('/') {
        let valid_chars = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if segment.is_empty() || segment == "." || segment == ".." || !valid_chars {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("incidents.json").is_ok());
        assert!(validate_key("fingerprints/homepage.json").is_ok());
        assert!(validate_key("content/rss-feed_2.body").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/./b").is_err());
        assert!(validate_key("with space").is_err());
        assert!(validate_key("/absolute").is_err());
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        let mut value = BTreeMap::new();
        value.insert("content_changed".to_string(), 42i64);

        put_json(&store, "alert_state.json", &value).unwrap();
        let loaded: Option<BTreeMap<String, i64>> = get_json(&store, "alert_state.json").unwrap();
        assert_eq!(loaded, Some(value));

        let missing: Option<BTreeMap<String, i64>> = get_json(&store, "nothing.json").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        let store = MemoryStore::new();
        store.put("broken.json", b"{not json").unwrap();
        let result: Result<Option<Vec<u32>>, _> = get_json(&store, "broken.json");
        assert!(matches!(result, Err(PersistenceError::Serialization(_))));
    }
}
