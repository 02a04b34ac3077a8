use std::collections::HashMap;
use std::path::Path;

use log::info;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use thiserror::Error;

/// Key of the serialized chain snapshot
pub const CHAIN_KEY: &str = "chain";

/// Key of the serialized wallet records
pub const WALLETS_KEY: &str = "wallets";

/// Key of the serialized pending pool
pub const PENDING_KEY: &str = "pendingTransactions";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Durable key-value store the ledger checkpoints into.
///
/// Every `put` is a full overwrite of the value under `key`.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Flushes all pending writes to durable media
    fn flush(&self) -> Result<(), StorageError>;
}

/// Encodes a value for storage
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

/// Decodes a stored value
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::DeserializationError(e.to_string()))
}

/// sled-backed state store
pub struct SledStore {
    /// The database instance
    db: Db,

    /// Tree holding the ledger snapshots
    state: Tree,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Opens (or creates) a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let state = db.open_tree("state")?;

        info!("sled store opened");
        Ok(Self { db, state })
    }
}

impl StateStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state.get(key.as_bytes())?.map(|value| value.to_vec()))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.state.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory state store, used when no data directory is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemoryStore::new();
        assert!(store.get(CHAIN_KEY).unwrap().is_none());

        store.put(CHAIN_KEY, vec![1, 2, 3]).unwrap();
        store.put(CHAIN_KEY, vec![4]).unwrap();
        assert_eq!(store.get(CHAIN_KEY).unwrap(), Some(vec![4]));
    }

    #[test]
    fn test_sled_store_persists_across_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = SledStore::open(dir.path()).unwrap();
            store.put(WALLETS_KEY, encode(&vec!["a", "b"]).unwrap()).unwrap();
            store.flush().unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        let bytes = store.get(WALLETS_KEY).unwrap().expect("value should persist");
        let decoded: Vec<String> = decode(&bytes).unwrap();
        assert_eq!(decoded, vec!["a".to_string(), "b".to_string()]);
        assert!(store.get(PENDING_KEY).unwrap().is_none());
    }

    #[test]
    fn test_decode_malformed() {
        let result: Result<Vec<String>, _> = decode(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(StorageError::DeserializationError(_))));
    }
}
