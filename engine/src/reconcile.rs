//! Reconciliation of a local snapshot against a fetched remote snapshot.
//!
//! # Algorithm
//!
//! 1. For each local record, look up the remote record with the same id:
//!    - same timestamp text: keep the local record verbatim
//!    - local strictly newer: queue the local record for upload
//!    - otherwise: keep the remote record (local is overwritten)
//!    - no remote match: upload if created offline, else drop it (deleted
//!      remotely by someone else)
//! 2. Every unmatched remote record is adopted, unless its id is pending a
//!    local delete.
//! 3. An empty local snapshot adopts the whole remote snapshot.
//!
//! The pass is deterministic: the same inputs always produce the same
//! buckets in the same order (local order first, then remote order).

use crate::{snapshot::Snapshot, timestamp, DeletedIdLog, Fields, Record, RecordId};
use std::collections::HashMap;

/// How a timestamp conflict was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Local record is newer and will be pushed upstream
    LocalWins,
    /// Remote record replaced the local one
    RemoteWins,
}

/// A record present on both sides with differing timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub id: RecordId,
    pub local_modified: Option<String>,
    pub remote_modified: Option<String>,
    pub resolution: ConflictResolution,
}

/// Buckets produced by one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult<T> {
    /// Offline-created records never pushed upstream
    pub to_create: Snapshot<T>,
    /// Local records newer than their remote copy
    pub to_update: Snapshot<T>,
    /// Records needing no upload (unchanged local or adopted remote)
    pub keep: Snapshot<T>,
    /// True when the pass altered the local view
    pub changed: bool,
    /// Timestamp conflicts with their resolution
    pub conflicts: Vec<Conflict>,
}

impl<T> ReconcileResult<T> {
    fn new() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            keep: Vec::new(),
            changed: false,
            conflicts: Vec::new(),
        }
    }

    /// Number of records that need a remote call.
    pub fn upload_count(&self) -> usize {
        self.to_create.len() + self.to_update.len()
    }

    /// The merged view without any remote calls: `keep`, then pending
    /// creates, then pending updates.
    pub fn into_local_view(self) -> Snapshot<T> {
        let mut view = self.keep;
        view.extend(self.to_create);
        view.extend(self.to_update);
        view
    }
}

/// Classifies records into upload and keep buckets.
pub struct Reconciler<'a, T> {
    fields: &'a Fields<T>,
}

impl<'a, T> Reconciler<'a, T> {
    /// Create a reconciler over the collection's selectors.
    pub fn new(fields: &'a Fields<T>) -> Self {
        Self { fields }
    }

    /// Diff `local` against `remote`.
    ///
    /// Remote records whose id is in `deleted` are pending a local delete
    /// and are never adopted.
    pub fn reconcile(
        &self,
        local: Snapshot<T>,
        remote: Snapshot<T>,
        deleted: &DeletedIdLog,
    ) -> ReconcileResult<T> {
        let mut result = ReconcileResult::new();

        if local.is_empty() {
            result.keep = remote
                .into_iter()
                .filter(|record| !self.is_pending_delete(record, deleted))
                .collect();
            result.changed = true;
            return result;
        }

        let mut index: HashMap<RecordId, usize> = HashMap::with_capacity(remote.len());
        for (position, record) in remote.iter().enumerate() {
            if let Some(id) = record.id(&self.fields.id) {
                index.entry(id).or_insert(position);
            }
        }
        let mut matched = vec![false; remote.len()];
        let mut remote: Vec<Option<Record<T>>> = remote.into_iter().map(Some).collect();

        for local_record in local {
            let position = local_record
                .id(&self.fields.id)
                .and_then(|id| index.get(&id).copied());

            let Some(position) = position else {
                if local_record.created_offline {
                    result.to_create.push(local_record);
                } else {
                    result.changed = true;
                }
                continue;
            };
            matched[position] = true;

            let Some(remote_record) = remote[position].as_ref() else {
                // Duplicate local id whose remote copy was already adopted
                result.changed = true;
                continue;
            };

            let local_modified = local_record.modified_at(&self.fields.modified);
            let remote_modified = remote_record.modified_at(&self.fields.modified);

            if local_modified == remote_modified {
                result.keep.push(local_record);
                continue;
            }

            let resolution =
                if timestamp::is_newer(local_modified.as_deref(), remote_modified.as_deref()) {
                    ConflictResolution::LocalWins
                } else {
                    ConflictResolution::RemoteWins
                };

            result.conflicts.push(Conflict {
                id: local_record.id(&self.fields.id).unwrap_or_default(),
                local_modified,
                remote_modified,
                resolution,
            });

            match resolution {
                ConflictResolution::LocalWins => result.to_update.push(local_record),
                ConflictResolution::RemoteWins => {
                    if let Some(remote_record) = remote[position].take() {
                        result.keep.push(remote_record);
                    }
                    result.changed = true;
                }
            }
        }

        for (position, slot) in remote.into_iter().enumerate() {
            if matched[position] {
                continue;
            }
            let Some(remote_record) = slot else {
                continue;
            };
            if self.is_pending_delete(&remote_record, deleted) {
                continue;
            }
            result.keep.push(remote_record);
            result.changed = true;
        }

        result
    }

    fn is_pending_delete(&self, record: &Record<T>, deleted: &DeletedIdLog) -> bool {
        record
            .id(&self.fields.id)
            .is_some_and(|id| deleted.contains(&id))
    }
}
