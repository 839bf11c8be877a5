//! Remote data service boundary.
//!
//! Every remote function is optional. An implementation advertises what it
//! supports through [`Capabilities`]; the engine never calls a function whose
//! capability is absent and degrades that step to local-only behavior.

use crate::error::RemoteError;
use crate::RecordId;
use async_trait::async_trait;

/// The set of remote functions an implementation provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub fetch_all: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Capabilities {
    /// Every function available.
    pub const ALL: Self = Self {
        fetch_all: true,
        create: true,
        update: true,
        delete: true,
    };

    /// Nothing available: the collection is local-only.
    pub const NONE: Self = Self {
        fetch_all: false,
        create: false,
        update: false,
        delete: false,
    };
}

/// The authoritative copy of a collection.
///
/// Unsupported functions keep their default body, which reports
/// [`RemoteError::Unsupported`].
#[async_trait]
pub trait RemoteService<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Which of the functions below are implemented.
    fn capabilities(&self) -> Capabilities;

    /// Fetch the full remote collection.
    async fn fetch_all(&self) -> Result<Vec<T>, RemoteError> {
        Err(RemoteError::Unsupported("fetch_all"))
    }

    /// Create a record. The server assigns the identifier of the result.
    async fn create(&self, _item: &T) -> Result<T, RemoteError> {
        Err(RemoteError::Unsupported("create"))
    }

    /// Replace a record.
    async fn update(&self, _item: &T) -> Result<T, RemoteError> {
        Err(RemoteError::Unsupported("update"))
    }

    /// Delete a record by identifier, returning the deleted identifier.
    async fn delete(&self, _id: &str) -> Result<RecordId, RemoteError> {
        Err(RemoteError::Unsupported("delete"))
    }
}
