//! The per-collection sync engine.
//!
//! A [`SyncEngine`] owns one collection's snapshot, its deleted-id log and
//! its sync bookkeeping. It loads and persists through a [`LocalStore`],
//! reconciles against a [`RemoteService`] and drives the upload cascade.
//!
//! State lives behind a mutex that is never held across an `.await`, so
//! every transition between suspension points is atomic with respect to
//! other calls on the same engine. Whole fetch cycles, local loads and
//! mutations are serialized by a second, async cycle lock: a mutation
//! issued while a cascade runs waits for the cascade to commit.

use crate::{
    cascade::{CascadePlan, CascadeReport},
    config::{DataLoadedHook, EngineConfig},
    error::Result,
    reconcile::Reconciler,
    remote::{Capabilities, RemoteService},
    snapshot::{self, KnownKeys, Snapshot, KNOWN_KEYS_KEY},
    store::LocalStore,
    CollectionId, DeletedIdLog, Error, Field, Fields, Payload, Record,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Observable engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    /// A mutation call is in progress
    pub loading: bool,
    /// Last failure message (overwritten by each new failure)
    pub error: Option<String>,
    /// The last reconciliation or mutation altered the snapshot
    pub has_data_changed: bool,
    /// Outstanding remote operations of the running cascade
    pub pending_changes: usize,
    /// A reconciliation cascade is running
    pub syncing: bool,
    /// A remote fetch has succeeded at least once
    pub already_remote_loaded: bool,
    /// The last cascade pushed every pending change
    pub remote_up_to_date: bool,
    /// Last connectivity reported by the caller
    pub online: bool,
    /// Records in the snapshot
    pub record_count: usize,
}

/// What a remote fetch cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<T> {
    /// The engine is offline; nothing was fetched
    Offline,
    /// No remote fetch function is configured
    Unavailable,
    /// The fetch failed; see the error field
    FetchFailed,
    /// Selectors are not configured; the remote snapshot was adopted as is
    DisplayOnly,
    /// No cascade ran. With sync disabled or offline the merged local view
    /// was adopted; with a cascade already running nothing was touched.
    Deferred,
    /// Reconciled and cascaded
    Synced(CascadeReport<T>),
}

pub(crate) struct EngineState<T> {
    pub(crate) data: Snapshot<T>,
    pub(crate) deleted: DeletedIdLog,
    pub(crate) syncing: bool,
    pub(crate) online: bool,
    pub(crate) loading: usize,
    pub(crate) error: Option<String>,
    pub(crate) has_data_changed: bool,
    pub(crate) pending_changes: usize,
    pub(crate) already_remote_loaded: bool,
    pub(crate) remote_up_to_date: bool,
}

impl<T> EngineState<T> {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            deleted: DeletedIdLog::new(),
            syncing: false,
            online: false,
            loading: 0,
            error: None,
            has_data_changed: false,
            pending_changes: 0,
            already_remote_loaded: false,
            remote_up_to_date: false,
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            loading: self.loading > 0,
            error: self.error.clone(),
            has_data_changed: self.has_data_changed,
            pending_changes: self.pending_changes,
            syncing: self.syncing,
            already_remote_loaded: self.already_remote_loaded,
            remote_up_to_date: self.remote_up_to_date,
            online: self.online,
            record_count: self.data.len(),
        }
    }
}

/// Offline-first engine for one collection.
pub struct SyncEngine<T> {
    collection: CollectionId,
    id_field: Option<Field<T>>,
    fields: Option<Fields<T>>,
    sync_enabled: bool,
    debug: bool,
    store: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteService<T>>>,
    state: Mutex<EngineState<T>>,
    cycle: tokio::sync::Mutex<()>,
    on_data_loaded: Mutex<Option<DataLoadedHook>>,
    status_tx: watch::Sender<EngineStatus>,
}

impl<T: Payload> SyncEngine<T> {
    /// Create an engine. Nothing is loaded until [`init`](Self::init).
    pub fn new(
        config: EngineConfig<T>,
        store: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteService<T>>>,
    ) -> Self {
        let fields = config.fields();
        let (status_tx, _) = watch::channel(EngineStatus::default());
        Self {
            collection: config.collection,
            id_field: config.id_field,
            fields,
            sync_enabled: config.sync_enabled,
            debug: config.debug,
            store,
            remote,
            state: Mutex::new(EngineState::new()),
            cycle: tokio::sync::Mutex::new(()),
            on_data_loaded: Mutex::new(config.on_data_loaded),
            status_tx,
        }
    }

    pub fn collection(&self) -> &CollectionId {
        &self.collection
    }

    /// Copy of the current snapshot.
    pub fn data(&self) -> Snapshot<T> {
        self.state.lock().data.clone()
    }

    /// Copy of the current payloads, without record markers.
    pub fn payloads(&self) -> Vec<T> {
        self.state
            .lock()
            .data
            .iter()
            .map(|record| record.payload.clone())
            .collect()
    }

    /// Identifiers deleted offline and not yet confirmed remotely.
    pub fn deleted_ids(&self) -> DeletedIdLog {
        self.state.lock().deleted.clone()
    }

    pub fn status(&self) -> EngineStatus {
        self.state.lock().status()
    }

    /// Watch status transitions.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.state.lock().syncing
    }

    /// Both selectors, or `None` in remote-display-only mode.
    pub fn fields(&self) -> Option<&Fields<T>> {
        self.fields.as_ref()
    }

    /// Record the caller's connectivity.
    pub fn set_online(&self, online: bool) {
        self.update_state(|state| state.online = online);
    }

    /// Register the collection key, then fetch remotely when online or load
    /// the local snapshot otherwise.
    pub async fn init(&self, online: bool) -> SyncOutcome<T> {
        self.register_key().await;
        self.set_online(online);
        if online {
            self.fetch_remote().await
        } else {
            self.load_local().await;
            SyncOutcome::Offline
        }
    }

    /// Replace the in-memory state with the persisted snapshot and log.
    ///
    /// Returns true if a snapshot was found and loaded.
    pub async fn load_local(&self) -> bool {
        let _cycle = self.cycle.lock().await;
        match self.store.get(&snapshot::deleted_key(&self.collection)).await {
            Ok(Some(json)) => match DeletedIdLog::from_json(&json) {
                Ok(log) => self.update_state(|state| state.deleted = log),
                Err(e) => self.record_error(&e),
            },
            Ok(None) => {}
            Err(e) => self.record_error(&Error::from(e)),
        }

        let json = match self.store.get(&snapshot::snapshot_key(&self.collection)).await {
            Ok(Some(json)) => json,
            Ok(None) => {
                debug!(collection = %self.collection, "No local data");
                return false;
            }
            Err(e) => {
                self.record_error(&Error::from(e));
                return false;
            }
        };

        match snapshot::from_json::<T>(&json) {
            Ok(data) => {
                self.trace_records("Loaded local data", &data);
                self.update_state(|state| state.data = data);
                self.notify_data_loaded();
                true
            }
            Err(e) => {
                self.record_error(&e);
                false
            }
        }
    }

    /// Reload from local storage.
    pub async fn refresh(&self) -> bool {
        self.load_local().await
    }

    /// Record connectivity and, when online, run a fetch and reconcile cycle.
    pub async fn sync(&self, online: bool) -> SyncOutcome<T> {
        self.set_online(online);
        if !online {
            return SyncOutcome::Offline;
        }
        self.fetch_remote().await
    }

    /// Fetch the remote snapshot and reconcile it against local storage.
    ///
    /// Returns [`SyncOutcome::Deferred`] without fetching if a cascade is
    /// already running. Otherwise waits for in-flight mutations first.
    pub async fn fetch_remote(&self) -> SyncOutcome<T> {
        let Some(remote) = self.remote_with(|caps| caps.fetch_all) else {
            return SyncOutcome::Unavailable;
        };
        if self.is_syncing() {
            debug!(collection = %self.collection, "Cascade already running, deferring");
            return SyncOutcome::Deferred;
        }
        let _cycle = self.cycle.lock().await;

        let fetched = match remote.fetch_all().await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.record_error(&Error::from(e));
                return SyncOutcome::FetchFailed;
            }
        };
        info!(collection = %self.collection, count = fetched.len(), "Fetched remote data");
        self.update_state(|state| state.already_remote_loaded = true);

        let remote_data: Snapshot<T> = fetched.into_iter().map(Record::new).collect();
        self.trace_records("Remote data", &remote_data);

        let Some(fields) = self.fields.as_ref() else {
            if self.debug {
                warn!(
                    collection = %self.collection,
                    "No identifier or modification field configured, displaying remote data only"
                );
            }
            self.update_state(|state| {
                state.data = remote_data;
                state.has_data_changed = true;
            });
            self.persist_logged().await;
            self.notify_data_loaded();
            return SyncOutcome::DisplayOnly;
        };

        let deleted = self.read_deleted_log().await;
        let local = self.read_local_snapshot().await;
        let result = Reconciler::new(fields).reconcile(local, remote_data, &deleted);

        debug!(
            collection = %self.collection,
            to_delete = deleted.len(),
            to_create = result.to_create.len(),
            to_update = result.to_update.len(),
            keep = result.keep.len(),
            conflicts = result.conflicts.len(),
            changed = result.changed,
            "Reconciled local and remote data"
        );

        let cascade_allowed = self.sync_enabled;
        let start = self.update_state(|state| {
            state.has_data_changed = result.changed || !deleted.is_empty();
            for id in deleted.ids() {
                state.deleted.push(id.clone());
            }
            if cascade_allowed && state.online {
                state.syncing = true;
                state.pending_changes = state.deleted.len() + result.upload_count();
                true
            } else {
                false
            }
        });

        if !start {
            debug!(collection = %self.collection, "Cascade skipped, adopting merged local view");
            let view = result.into_local_view();
            self.update_state(|state| state.data = view);
            self.persist_logged().await;
            self.notify_data_loaded();
            return SyncOutcome::Deferred;
        }

        let plan = CascadePlan {
            to_delete: self.deleted_ids().ids().to_vec(),
            to_create: result.to_create,
            to_update: result.to_update,
            keep: result.keep,
        };
        SyncOutcome::Synced(self.run_cascade(plan).await)
    }

    /// Write the current snapshot to the local store.
    pub async fn persist(&self) -> Result<()> {
        let json = {
            let state = self.state.lock();
            snapshot::to_json(&state.data)?
        };
        self.store
            .set(&snapshot::snapshot_key(&self.collection), json)
            .await?;
        Ok(())
    }

    /// Write the deleted-id log to the local store.
    pub async fn persist_deleted(&self) -> Result<()> {
        let json = self.state.lock().deleted.to_json()?;
        self.store
            .set(&snapshot::deleted_key(&self.collection), json)
            .await?;
        Ok(())
    }

    pub(crate) async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            self.record_error(&e);
        }
    }

    pub(crate) async fn persist_deleted_logged(&self) {
        if let Err(e) = self.persist_deleted().await {
            self.record_error(&e);
        }
    }

    /// Add this collection to the store's list of known keys.
    async fn register_key(&self) {
        let current = match self.store.get(KNOWN_KEYS_KEY).await {
            Ok(current) => current,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "Failed to read known keys");
                return;
            }
        };
        let mut keys = KnownKeys::parse(current.as_deref());
        if !keys.insert(&self.collection) {
            return;
        }
        let written = match keys.to_json() {
            Ok(json) => self.store.set(KNOWN_KEYS_KEY, json).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(collection = %self.collection, error = %e, "Failed to save known keys");
        }
    }

    /// Persisted deleted-id log. Read or parse failures count as empty.
    async fn read_deleted_log(&self) -> DeletedIdLog {
        match self.store.get(&snapshot::deleted_key(&self.collection)).await {
            Ok(Some(json)) => DeletedIdLog::from_json(&json).unwrap_or_else(|e| {
                self.record_error(&e);
                DeletedIdLog::new()
            }),
            Ok(None) => DeletedIdLog::new(),
            Err(e) => {
                self.record_error(&Error::from(e));
                DeletedIdLog::new()
            }
        }
    }

    /// Persisted snapshot. Read or parse failures count as empty.
    async fn read_local_snapshot(&self) -> Snapshot<T> {
        match self.store.get(&snapshot::snapshot_key(&self.collection)).await {
            Ok(Some(json)) => snapshot::from_json(&json).unwrap_or_else(|e| {
                self.record_error(&e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                self.record_error(&Error::Store(e));
                Vec::new()
            }
        }
    }

    /// The remote service, if it provides the selected capability.
    pub(crate) fn remote_with(
        &self,
        select: impl Fn(&Capabilities) -> bool,
    ) -> Option<&Arc<dyn RemoteService<T>>> {
        self.remote
            .as_ref()
            .filter(|remote| select(&remote.capabilities()))
    }

    /// Capabilities of the configured remote, or none without one.
    pub fn capabilities(&self) -> Capabilities {
        self.remote
            .as_ref()
            .map(|remote| remote.capabilities())
            .unwrap_or(Capabilities::NONE)
    }

    /// Wait for any running fetch cycle, load or mutation to finish.
    pub(crate) async fn lock_cycle(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.cycle.lock().await
    }

    pub(crate) fn id_field(&self) -> Option<&Field<T>> {
        self.id_field.as_ref()
    }

    /// Read state without publishing a status update.
    pub(crate) fn read_state<R>(&self, read: impl FnOnce(&EngineState<T>) -> R) -> R {
        let state = self.state.lock();
        read(&*state)
    }

    /// Apply a state change and publish the resulting status.
    pub(crate) fn update_state<R>(&self, apply: impl FnOnce(&mut EngineState<T>) -> R) -> R {
        let (result, status) = {
            let mut state = self.state.lock();
            let result = apply(&mut *state);
            (result, state.status())
        };
        self.status_tx.send_replace(status);
        result
    }

    /// Overwrite the shared error field.
    pub(crate) fn record_error(&self, err: &Error) {
        error!(collection = %self.collection, error = %err, "Sync engine error");
        let message = err.to_string();
        self.update_state(|state| state.error = Some(message));
    }

    /// Fire the data-loaded hook; later calls are no-ops.
    pub(crate) fn notify_data_loaded(&self) {
        let hook = self.on_data_loaded.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn trace_records(&self, message: &str, records: &[Record<T>]) {
        if !self.debug {
            return;
        }
        let payload = serde_json::to_string(records).unwrap_or_default();
        debug!(collection = %self.collection, %payload, "{message}");
    }
}
