//! Process-wide map from collection identifier to engine.
//!
//! The registry is owned by the application's composition root and shared
//! via `Arc`. Each collection gets exactly one engine; asking again for the
//! same collection returns the existing instance.

use crate::{error::Result, CollectionId, Error, Payload, SyncEngine};
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use tracing::info;

type AnyEngine = Arc<dyn Any + Send + Sync>;

/// Hands out one engine per collection.
#[derive(Default)]
pub struct Registry {
    engines: DashMap<CollectionId, AnyEngine>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry wrapped in `Arc` for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The engine for `collection`, built with `make` on first request.
    ///
    /// Fails with [`Error::TypeMismatch`] if the collection was registered
    /// with a different record type.
    pub fn get_or_create<T: Payload>(
        &self,
        collection: &str,
        make: impl FnOnce() -> SyncEngine<T>,
    ) -> Result<Arc<SyncEngine<T>>> {
        let engine = self
            .engines
            .entry(collection.to_string())
            .or_insert_with(|| {
                info!(collection, "Registering sync engine");
                Arc::new(make()) as AnyEngine
            })
            .clone();
        downcast(collection, engine)
    }

    /// The engine for `collection`, if registered.
    pub fn get<T: Payload>(&self, collection: &str) -> Result<Option<Arc<SyncEngine<T>>>> {
        match self.engines.get(collection) {
            Some(entry) => {
                let engine = entry.value().clone();
                drop(entry);
                downcast(collection, engine).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.engines.contains_key(collection)
    }

    /// Registered collection identifiers, sorted.
    pub fn collections(&self) -> Vec<CollectionId> {
        let mut collections: Vec<_> = self.engines.iter().map(|e| e.key().clone()).collect();
        collections.sort();
        collections
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

fn downcast<T: Payload>(collection: &str, engine: AnyEngine) -> Result<Arc<SyncEngine<T>>> {
    engine
        .downcast::<SyncEngine<T>>()
        .map_err(|_| Error::TypeMismatch {
            collection: collection.to_string(),
        })
}
