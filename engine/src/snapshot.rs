//! Snapshot persistence format.
//!
//! A collection persists as two entries in the local store: the snapshot
//! itself under the collection id, and the log of identifiers deleted while
//! offline under `{collection}_deleted`. Both are plain JSON arrays and are
//! round-tripped in their current order.

use crate::{error::Result, CollectionId, Error, Field, Record, RecordId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The full ordered set of records of one collection.
pub type Snapshot<T> = Vec<Record<T>>;

/// Store key listing every collection that ever persisted data.
pub const KNOWN_KEYS_KEY: &str = "NEXUSSYNC_KEYS";

const DELETED_SUFFIX: &str = "_deleted";

/// Store key for a collection's snapshot.
pub fn snapshot_key(collection: &str) -> String {
    collection.to_string()
}

/// Store key for a collection's deleted-id log.
pub fn deleted_key(collection: &str) -> String {
    format!("{collection}{DELETED_SUFFIX}")
}

/// Serialize a snapshot for the local store.
pub fn to_json<T: Serialize>(snapshot: &[Record<T>]) -> Result<String> {
    serde_json::to_string(snapshot).map_err(|e| Error::InvalidSnapshot(e.to_string()))
}

/// Deserialize a persisted snapshot.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<Snapshot<T>> {
    serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
}

/// Index of the record whose identifier equals `id`.
pub fn position<T>(snapshot: &[Record<T>], field: &Field<T>, id: &str) -> Option<usize> {
    snapshot
        .iter()
        .position(|record| record.id(field).as_deref() == Some(id))
}

/// Identifiers removed locally whose remote delete is not yet confirmed.
///
/// Insertion order is preserved; duplicates are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeletedIdLog {
    ids: Vec<RecordId>,
}

impl DeletedIdLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier. Returns false if it was already logged.
    pub fn push(&mut self, id: impl Into<RecordId>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|logged| logged == id)
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drop every identifier in `ids`, keeping any logged since.
    pub fn remove_all(&mut self, ids: &[RecordId]) {
        self.ids.retain(|logged| !ids.contains(logged));
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let ids: Vec<RecordId> =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        let mut log = Self::new();
        for id in ids {
            log.push(id);
        }
        Ok(log)
    }
}

impl FromIterator<RecordId> for DeletedIdLog {
    fn from_iter<I: IntoIterator<Item = RecordId>>(iter: I) -> Self {
        let mut log = Self::new();
        for id in iter {
            log.push(id);
        }
        log
    }
}

/// The list of collection keys stored under [`KNOWN_KEYS_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownKeys(Vec<CollectionId>);

impl KnownKeys {
    /// Parse the persisted list, treating malformed data as empty.
    pub fn parse(json: Option<&str>) -> Self {
        json.and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }

    /// Add a key. Returns false if it was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.0.iter().any(|known| known == key) {
            return false;
        }
        self.0.push(key.to_string());
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionId> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }
}
