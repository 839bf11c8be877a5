//! Upload cascade run after reconciliation.
//!
//! Three stages run strictly in order: delete, create, update. Each stage
//! issues its remote calls concurrently and waits for every call to settle
//! before its effects (log clear, counter decrement, merge) are applied and
//! the next stage starts. Deletes go first so an identifier freed remotely
//! cannot collide with one assigned by a create in the same cycle.
//!
//! A failed call drops only its own item; sibling items and later stages
//! always run. A stage whose remote capability is absent keeps its items
//! locally instead.

use crate::{engine::SyncEngine, snapshot::Snapshot, Error, Payload, Record, RecordId};
use futures::future::join_all;
use std::fmt;
use tracing::{debug, info, warn};

/// A stage of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Delete,
    Create,
    Update,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// One failed remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub id: Option<RecordId>,
    pub error: Error,
}

/// Outcome of a cascade run.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeReport<T> {
    /// Remote deletes that succeeded
    pub deleted: usize,
    /// Remote creates that succeeded
    pub created: usize,
    /// Remote updates that succeeded
    pub updated: usize,
    /// Stages with pending items but no remote capability
    pub local_only: Vec<Stage>,
    /// Failures in the order their items were queued
    pub failures: Vec<StageFailure>,
    /// Records dropped from the snapshot because their upload failed
    pub unsent: Snapshot<T>,
}

impl<T> Default for CascadeReport<T> {
    fn default() -> Self {
        Self {
            deleted: 0,
            created: 0,
            updated: 0,
            local_only: Vec::new(),
            failures: Vec::new(),
            unsent: Vec::new(),
        }
    }
}

impl<T> CascadeReport<T> {
    /// True when every pending change reached the remote side.
    pub fn is_complete(&self) -> bool {
        self.local_only.is_empty() && self.failures.is_empty()
    }
}

/// Buckets handed from reconciliation to the cascade.
pub(crate) struct CascadePlan<T> {
    pub(crate) to_delete: Vec<RecordId>,
    pub(crate) to_create: Snapshot<T>,
    pub(crate) to_update: Snapshot<T>,
    pub(crate) keep: Snapshot<T>,
}

impl<T: Payload> SyncEngine<T> {
    /// Drive the delete, create and update stages, then commit `keep` as
    /// the new snapshot.
    pub(crate) async fn run_cascade(&self, plan: CascadePlan<T>) -> CascadeReport<T> {
        let CascadePlan {
            to_delete,
            to_create,
            to_update,
            mut keep,
        } = plan;
        let mut report = CascadeReport::default();

        info!(
            collection = %self.collection(),
            to_delete = to_delete.len(),
            to_create = to_create.len(),
            to_update = to_update.len(),
            "Starting upload cascade"
        );

        self.delete_stage(&to_delete, &mut report).await;
        self.upload_stage(Stage::Create, to_create, &mut keep, &mut report)
            .await;
        self.upload_stage(Stage::Update, to_update, &mut keep, &mut report)
            .await;

        let uploaded = report.created + report.updated;
        let complete = report.is_complete();
        self.update_state(|state| {
            state.data = keep;
            state.syncing = false;
            // Skipped stages never issued their calls
            state.pending_changes = 0;
            state.remote_up_to_date = complete;
            if uploaded > 0 {
                state.has_data_changed = true;
            }
        });
        self.persist_logged().await;
        self.notify_data_loaded();

        info!(
            collection = %self.collection(),
            deleted = report.deleted,
            created = report.created,
            updated = report.updated,
            failures = report.failures.len(),
            "Upload cascade finished"
        );
        report
    }

    async fn delete_stage(&self, to_delete: &[RecordId], report: &mut CascadeReport<T>) {
        if to_delete.is_empty() {
            return;
        }
        let Some(remote) = self.remote_with(|caps| caps.delete) else {
            debug!(collection = %self.collection(), "No remote delete, keeping deleted-id log");
            report.local_only.push(Stage::Delete);
            return;
        };

        let outcomes = join_all(to_delete.iter().map(|id| remote.delete(id))).await;
        for (id, outcome) in to_delete.iter().zip(outcomes) {
            match outcome {
                Ok(_) => report.deleted += 1,
                Err(e) => self.record_failure(report, Stage::Delete, Some(id.clone()), e.into()),
            }
        }

        self.update_state(|state| {
            state.deleted.remove_all(to_delete);
            state.pending_changes = state.pending_changes.saturating_sub(to_delete.len());
        });
        self.persist_deleted_logged().await;
    }

    /// Create or update stage. Successful results join `keep`; without the
    /// capability the items join `keep` unchanged.
    async fn upload_stage(
        &self,
        stage: Stage,
        items: Snapshot<T>,
        keep: &mut Snapshot<T>,
        report: &mut CascadeReport<T>,
    ) {
        if items.is_empty() {
            return;
        }
        let remote = match stage {
            Stage::Create => self.remote_with(|caps| caps.create),
            _ => self.remote_with(|caps| caps.update),
        };
        let Some(remote) = remote else {
            debug!(
                collection = %self.collection(),
                %stage,
                count = items.len(),
                "No remote capability, keeping items locally"
            );
            report.local_only.push(stage);
            keep.extend(items);
            return;
        };

        let count = items.len();
        let outcomes = join_all(items.iter().map(|record| async move {
            match stage {
                Stage::Create => remote.create(&record.payload).await,
                _ => remote.update(&record.payload).await,
            }
        }))
        .await;

        for (record, outcome) in items.into_iter().zip(outcomes) {
            match outcome {
                Ok(uploaded) => {
                    match stage {
                        Stage::Create => report.created += 1,
                        _ => report.updated += 1,
                    }
                    keep.push(Record::new(uploaded));
                }
                Err(e) => {
                    let id = self.id_field().and_then(|field| record.id(field));
                    self.record_failure(report, stage, id, e.into());
                    report.unsent.push(record);
                }
            }
        }

        self.update_state(|state| {
            state.pending_changes = state.pending_changes.saturating_sub(count);
        });
    }

    fn record_failure(
        &self,
        report: &mut CascadeReport<T>,
        stage: Stage,
        id: Option<RecordId>,
        error: Error,
    ) {
        warn!(
            collection = %self.collection(),
            %stage,
            id = ?id,
            error = %error,
            "Remote call failed"
        );
        self.record_error(&error);
        report.failures.push(StageFailure { stage, id, error });
    }
}
