//! Engine construction parameters.

use crate::{CollectionId, Field, Fields};
use std::fmt;

/// Callback fired the first time a snapshot becomes available.
pub type DataLoadedHook = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for one collection's engine.
pub struct EngineConfig<T> {
    /// Collection identifier, also the storage key
    pub collection: CollectionId,
    /// Identifier selector (enables diffing, update and delete)
    pub id_field: Option<Field<T>>,
    /// Modification timestamp selector (enables conflict resolution)
    pub modified_field: Option<Field<T>>,
    /// Run the upload cascade after reconciliation
    pub sync_enabled: bool,
    /// Verbose payload logging
    pub debug: bool,
    pub(crate) on_data_loaded: Option<DataLoadedHook>,
}

impl<T> EngineConfig<T> {
    pub fn new(collection: impl Into<CollectionId>) -> Self {
        Self {
            collection: collection.into(),
            id_field: None,
            modified_field: None,
            sync_enabled: true,
            debug: false,
            on_data_loaded: None,
        }
    }

    pub fn id_field(mut self, field: Field<T>) -> Self {
        self.id_field = Some(field);
        self
    }

    pub fn modified_field(mut self, field: Field<T>) -> Self {
        self.modified_field = Some(field);
        self
    }

    pub fn sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the data-loaded notification. It fires at most once per engine.
    pub fn on_data_loaded(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_data_loaded = Some(Box::new(hook));
        self
    }

    /// Both selectors, if configured. `None` means remote-display-only mode.
    pub fn fields(&self) -> Option<Fields<T>> {
        match (&self.id_field, &self.modified_field) {
            (Some(id), Some(modified)) => Some(Fields::new(id.clone(), modified.clone())),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for EngineConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("collection", &self.collection)
            .field("id_field", &self.id_field)
            .field("modified_field", &self.modified_field)
            .field("sync_enabled", &self.sync_enabled)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
