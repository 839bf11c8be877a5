//! Error types for the sync engine.

use crate::{CollectionId, RecordId};
use thiserror::Error;

/// All possible errors from the sync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("no identifier field configured for collection {0}")]
    MissingIdField(CollectionId),

    #[error("no modification timestamp field configured for collection {0}")]
    MissingModifiedField(CollectionId),

    // Record errors
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("record has no identifier value")]
    MissingIdentifier,

    // Collaborator errors
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("collection {collection} is registered with a different record type")]
    TypeMismatch { collection: CollectionId },
}

impl Error {
    /// True for errors caused by missing field selectors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::MissingIdField(_) | Error::MissingModifiedField(_))
    }
}

/// Failure reported by a remote service call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote {0} is not supported")]
    Unsupported(&'static str),

    #[error("remote call failed: {0}")]
    Failed(String),
}

/// Failure reported by the local snapshot store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to read {key}: {message}")]
    Read { key: String, message: String },

    #[error("failed to write {key}: {message}")]
    Write { key: String, message: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
