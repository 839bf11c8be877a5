//! Local snapshot store.
//!
//! The engine persists through a small string key-value interface so any
//! platform store (files, SQLite, mobile key-value storage) can back it.

use crate::error::{self, StoreError};
use crate::snapshot::{deleted_key, snapshot_key, KnownKeys, KNOWN_KEYS_KEY};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Persistent string key-value storage used for snapshots and logs.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Read a value without going through the async interface.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Remove every collection snapshot and deleted-id log ever persisted
/// through `store`, then the key list itself.
///
/// In-memory engine state is untouched; callers reload afterwards.
pub async fn clear_all_local_data(store: &dyn LocalStore) -> error::Result<()> {
    let known = KnownKeys::parse(store.get(KNOWN_KEYS_KEY).await?.as_deref());
    let mut cleared = 0usize;
    for collection in known.iter() {
        store.remove(&snapshot_key(collection)).await?;
        store.remove(&deleted_key(collection)).await?;
        cleared += 1;
    }
    store.remove(KNOWN_KEYS_KEY).await?;
    info!(collections = cleared, "Cleared all local data");
    Ok(())
}
