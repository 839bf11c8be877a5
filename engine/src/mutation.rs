//! Direct create, update and delete calls.
//!
//! Online calls go to the remote service first and touch the snapshot only
//! after it succeeds. Offline calls change the snapshot immediately and
//! leave the upload to the next reconciliation: creates carry the
//! created-while-offline marker, updates carry a fresh timestamp, deletes
//! land in the deleted-id log.
//!
//! A mutation issued while a fetch cycle runs waits for the cycle to commit,
//! so the cascade never overwrites it.

use crate::{
    engine::SyncEngine, error::Result, snapshot, timestamp, Error, Field, Fields, Payload,
    Record, RecordId,
};
use tracing::{debug, info};

/// Marks the engine as loading for the lifetime of one mutation call.
struct LoadingGuard<'a, T: Payload> {
    engine: &'a SyncEngine<T>,
}

impl<'a, T: Payload> LoadingGuard<'a, T> {
    fn new(engine: &'a SyncEngine<T>) -> Self {
        engine.update_state(|state| state.loading += 1);
        Self { engine }
    }
}

impl<T: Payload> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        self.engine
            .update_state(|state| state.loading = state.loading.saturating_sub(1));
    }
}

impl<T: Payload> SyncEngine<T> {
    /// Create a record.
    ///
    /// Online with a remote create function, the server's record is
    /// appended. Otherwise the record gets a local identifier and timestamp
    /// and is marked as created offline; that path needs both selectors.
    ///
    /// The returned record carries the identifier the remote side assigned,
    /// or the synthesized local one. Callers tracking the item by a
    /// temporary id map it to the new one from here.
    pub async fn create(&self, item: T, online: bool) -> Result<Record<T>> {
        let _loading = LoadingGuard::new(self);
        let _cycle = self.lock_cycle().await;

        if online {
            if let Some(remote) = self.remote_with(|caps| caps.create) {
                let created = match remote.create(&item).await {
                    Ok(created) => Record::new(created),
                    Err(e) => return Err(self.reject(e.into())),
                };
                self.append(created.clone()).await;
                info!(collection = %self.collection(), "Created record remotely");
                return Ok(created);
            }
        }

        let fields = self.require_fields().map_err(|e| self.reject(e))?;
        let mut payload = item;
        fields.modified.set(&mut payload, timestamp::now());
        fields.id.set(&mut payload, timestamp::next_local_id());
        let created = Record::offline(payload);

        self.append(created.clone()).await;
        debug!(collection = %self.collection(), "Created record offline");
        Ok(created)
    }

    /// Replace an existing record, matched by identifier.
    ///
    /// Online with a remote update function, the server's record replaces
    /// the entry (keeping the requested identifier). Otherwise the item is
    /// stamped with the current time and replaces the entry in place.
    pub async fn update(&self, item: T, online: bool) -> Result<Record<T>> {
        let fields = self.require_fields().map_err(|e| self.reject(e))?;
        let _loading = LoadingGuard::new(self);
        let _cycle = self.lock_cycle().await;
        let id = self.require_existing(&fields.id.get(&item))?;

        if online {
            if let Some(remote) = self.remote_with(|caps| caps.update) {
                let mut updated = match remote.update(&item).await {
                    Ok(updated) => updated,
                    Err(e) => return Err(self.reject(e.into())),
                };
                fields.id.set(&mut updated, id.clone());
                let updated = Record::new(updated);
                self.replace(fields, &id, updated.clone()).await;
                info!(collection = %self.collection(), %id, "Updated record remotely");
                return Ok(updated);
            }
        }

        let mut payload = item;
        fields.modified.set(&mut payload, timestamp::now());
        let created_offline = self.read_state(|state| {
            snapshot::position(&state.data, &fields.id, &id)
                .is_some_and(|position| state.data[position].created_offline)
        });
        let updated = Record {
            payload,
            created_offline,
        };
        self.replace(fields, &id, updated.clone()).await;
        debug!(collection = %self.collection(), %id, "Updated record offline");
        Ok(updated)
    }

    /// Remove a record, matched by identifier. Returns the removed record.
    ///
    /// Online with a remote delete function, the entry is removed once the
    /// remote delete succeeds. Otherwise it is removed immediately and its
    /// identifier is logged for upload, unless it never reached the remote
    /// side.
    pub async fn delete(&self, item: &T, online: bool) -> Result<Record<T>> {
        let Some(id_field) = self.id_field() else {
            return Err(self.reject(Error::MissingIdField(self.collection().clone())));
        };
        let _loading = LoadingGuard::new(self);
        let _cycle = self.lock_cycle().await;
        let id = self.require_existing(&id_field.get(item))?;

        if online {
            if let Some(remote) = self.remote_with(|caps| caps.delete) {
                if let Err(e) = remote.delete(&id).await {
                    return Err(self.reject(e.into()));
                }
                let removed = self.remove(id_field, &id, false);
                self.persist_logged().await;
                info!(collection = %self.collection(), %id, "Deleted record remotely");
                return removed.ok_or(Error::RecordNotFound(id));
            }
        }

        let removed = self.remove(id_field, &id, true);
        self.persist_deleted_logged().await;
        self.persist_logged().await;
        debug!(collection = %self.collection(), %id, "Deleted record offline");
        removed.ok_or(Error::RecordNotFound(id))
    }

    fn require_fields(&self) -> Result<&Fields<T>> {
        match self.fields() {
            Some(fields) => Ok(fields),
            None if self.id_field().is_none() => {
                Err(Error::MissingIdField(self.collection().clone()))
            }
            None => Err(Error::MissingModifiedField(self.collection().clone())),
        }
    }

    /// The identifier, if present and matching an entry in the snapshot.
    fn require_existing(&self, id: &Option<RecordId>) -> Result<RecordId> {
        let Some(id) = id.clone() else {
            return Err(self.reject(Error::MissingIdentifier));
        };
        let found = self.read_state(|state| {
            self.id_field()
                .and_then(|field| snapshot::position(&state.data, field, &id))
                .is_some()
        });
        if found {
            Ok(id)
        } else {
            Err(self.reject(Error::RecordNotFound(id)))
        }
    }

    /// Record a failure in the error field and hand it back for returning.
    fn reject(&self, err: Error) -> Error {
        self.record_error(&err);
        err
    }

    async fn append(&self, record: Record<T>) {
        self.update_state(|state| {
            state.data.push(record);
            state.has_data_changed = true;
        });
        self.persist_logged().await;
    }

    async fn replace(&self, fields: &Fields<T>, id: &str, record: Record<T>) {
        self.update_state(|state| {
            if let Some(position) = snapshot::position(&state.data, &fields.id, id) {
                state.data[position] = record;
                state.has_data_changed = true;
            }
        });
        self.persist_logged().await;
    }

    /// Remove the entry from memory, optionally logging the identifier for
    /// a later remote delete.
    fn remove(&self, id_field: &Field<T>, id: &str, log_delete: bool) -> Option<Record<T>> {
        self.update_state(|state| {
            let position = snapshot::position(&state.data, id_field, id)?;
            let removed = state.data.remove(position);
            state.has_data_changed = true;
            if log_delete && !removed.created_offline {
                state.deleted.push(id);
            }
            Some(removed)
        })
    }
}
