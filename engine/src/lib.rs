//! # Nexus Sync
//!
//! An offline-first sync engine for collections of records.
//!
//! Each collection keeps a full snapshot in a local store. While offline,
//! changes are applied to that snapshot directly: new records carry a
//! "created offline" marker and deletions are written to a deleted-id log.
//! When connectivity returns, the engine fetches the remote collection,
//! reconciles it against the local snapshot and uploads the difference.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] wraps an opaque payload. The engine reaches the identifier
//! and the modification timestamp through [`Field`] selectors, so any
//! serde type can be synced. Without both selectors the engine runs in
//! remote-display-only mode and simply mirrors the remote collection.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] splits local and remote snapshots into records to
//! create remotely, records to update remotely and records to keep.
//! Conflicts are decided last-writer-wins on the modification timestamp;
//! identifiers in the deleted-id log are never resurrected.
//!
//! ### Upload cascade
//!
//! After reconciliation the engine runs three stages in order: delete,
//! create, update. Calls within a stage run concurrently; one failed call
//! never aborts its siblings or later stages. See [`CascadeReport`].
//!
//! ### Mutations
//!
//! [`SyncEngine::create`], [`SyncEngine::update`] and [`SyncEngine::delete`]
//! go straight to the remote service when online and fall back to local
//! changes otherwise.
//!
//! ## Quick Start
//!
//! ```rust
//! use nexus_sync::{EngineConfig, Field, MemoryStore, SyncEngine};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> nexus_sync::Result<()> {
//! // 1. Configure the collection
//! let config = EngineConfig::new("notes")
//!     .id_field(Field::json("id"))
//!     .modified_field(Field::json("modified"));
//!
//! // 2. Create an engine backed by an in-memory store, with no remote
//! let engine = SyncEngine::new(config, Arc::new(MemoryStore::new()), None);
//! engine.init(false).await;
//!
//! // 3. Create a record while offline
//! let created = engine.create(json!({"title": "draft"}), false).await?;
//! assert!(created.created_offline);
//!
//! // 4. Read the snapshot
//! assert_eq!(engine.data().len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistence
//!
//! Snapshots go through the [`LocalStore`] trait as JSON strings: the
//! snapshot under the collection id and the deleted-id log under
//! `{collection}_deleted`. [`clear_all_local_data`] wipes everything the
//! engines ever persisted.

pub mod cascade;
pub mod config;
pub mod engine;
pub mod error;
mod mutation;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod remote;
pub mod snapshot;
pub mod store;
pub mod timestamp;

// Re-export main types at crate root
pub use cascade::{CascadeReport, Stage, StageFailure};
pub use config::{DataLoadedHook, EngineConfig};
pub use engine::{EngineStatus, SyncEngine, SyncOutcome};
pub use error::{Error, RemoteError, Result, StoreError};
pub use reconcile::{Conflict, ConflictResolution, ReconcileResult, Reconciler};
pub use record::{Field, Fields, Payload, Record};
pub use registry::Registry;
pub use remote::{Capabilities, RemoteService};
pub use snapshot::{DeletedIdLog, Snapshot};
pub use store::{clear_all_local_data, LocalStore, MemoryStore};

/// Type aliases for clarity
pub type RecordId = String;
pub type CollectionId = String;
