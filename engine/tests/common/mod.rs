//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nexus_sync::{
    Capabilities, EngineConfig, Field, LocalStore, MemoryStore, Record, RecordId, RemoteError,
    RemoteService, StoreError, SyncEngine,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Notify;

pub const COLLECTION: &str = "notes";

pub fn note(id: &str, modified: &str) -> Value {
    json!({"id": id, "mod": modified, "title": format!("note {id}")})
}

pub fn config() -> EngineConfig<Value> {
    EngineConfig::new(COLLECTION)
        .id_field(Field::json("id"))
        .modified_field(Field::json("mod"))
}

pub fn engine(
    config: EngineConfig<Value>,
    store: Arc<MemoryStore>,
    remote: Option<Arc<MockRemote>>,
) -> SyncEngine<Value> {
    let remote = remote.map(|remote| remote as Arc<dyn RemoteService<Value>>);
    SyncEngine::new(config, store, remote)
}

/// Seed the store with a persisted snapshot.
pub async fn seed(store: &MemoryStore, records: Vec<Record<Value>>) {
    let json = serde_json::to_string(&records).unwrap();
    store.set(COLLECTION, json).await.unwrap();
}

pub async fn seed_deleted(store: &MemoryStore, ids: &[&str]) {
    let json = serde_json::to_string(ids).unwrap();
    store.set(&format!("{COLLECTION}_deleted"), json).await.unwrap();
}

pub fn ids(records: &[Record<Value>]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.payload["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted remote service.
///
/// Holds the server-side collection, assigns `srv-N` identifiers on create
/// and logs every call as `"{op}:{id}:start"` / `"{op}:{id}:end"`.
pub struct MockRemote {
    capabilities: Capabilities,
    records: Mutex<Vec<Value>>,
    calls: Mutex<Vec<String>>,
    fail_ids: Mutex<HashSet<String>>,
    fail_fetch: Mutex<bool>,
    next_id: Mutex<u32>,
    gate: Option<Arc<Notify>>,
    entered: Arc<Notify>,
}

impl MockRemote {
    pub fn new(records: Vec<Value>) -> Self {
        Self::with_capabilities(records, Capabilities::ALL)
    }

    pub fn with_capabilities(records: Vec<Value>, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            records: Mutex::new(records),
            calls: Mutex::new(Vec::new()),
            fail_ids: Mutex::new(HashSet::new()),
            fail_fetch: Mutex::new(false),
            next_id: Mutex::new(0),
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    /// Block create and update calls until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified when a gated call is waiting.
    pub fn entered(&self) -> Arc<Notify> {
        Arc::clone(&self.entered)
    }

    /// Make every call touching `id` fail.
    pub fn fail_on(&self, id: &str) {
        self.fail_ids.lock().insert(id.to_string());
    }

    pub fn fail_fetch(&self) {
        *self.fail_fetch.lock() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Only the `start` events, without the suffix.
    pub fn started(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| call.strip_suffix(":start").map(str::to_string))
            .collect()
    }

    pub fn records(&self) -> Vec<Value> {
        self.records.lock().clone()
    }

    async fn enter(&self, op: &str, id: &str) -> Result<(), RemoteError> {
        self.calls.lock().push(format!("{op}:{id}:start"));
        if let Some(gate) = &self.gate {
            if op != "delete" {
                self.entered.notify_one();
                gate.notified().await;
            }
        }
        // Let sibling calls interleave
        tokio::task::yield_now().await;
        let failed = self.fail_ids.lock().contains(id);
        self.calls.lock().push(format!("{op}:{id}:end"));
        if failed {
            Err(RemoteError::Failed(format!("{op} {id} rejected")))
        } else {
            Ok(())
        }
    }
}

fn id_of(item: &Value) -> String {
    item["id"].as_str().unwrap_or_default().to_string()
}

#[async_trait]
impl RemoteService<Value> for MockRemote {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn fetch_all(&self) -> Result<Vec<Value>, RemoteError> {
        self.calls.lock().push("fetch".to_string());
        if *self.fail_fetch.lock() {
            return Err(RemoteError::Failed("network down".into()));
        }
        Ok(self.records.lock().clone())
    }

    async fn create(&self, item: &Value) -> Result<Value, RemoteError> {
        self.enter("create", &id_of(item)).await?;
        let mut created = item.clone();
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            format!("srv-{}", *next)
        };
        created["id"] = Value::String(id);
        self.records.lock().push(created.clone());
        Ok(created)
    }

    async fn update(&self, item: &Value) -> Result<Value, RemoteError> {
        let id = id_of(item);
        self.enter("update", &id).await?;
        let mut records = self.records.lock();
        if let Some(existing) = records.iter_mut().find(|r| id_of(r) == id) {
            *existing = item.clone();
        }
        Ok(item.clone())
    }

    async fn delete(&self, id: &str) -> Result<RecordId, RemoteError> {
        self.enter("delete", id).await?;
        self.records.lock().retain(|r| id_of(r) != id);
        Ok(id.to_string())
    }
}

/// Store whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock() = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.peek(key)
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if *self.fail_reads.lock() {
            return Err(StoreError::Read {
                key: key.to_string(),
                message: "disk unavailable".into(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        if *self.fail_writes.lock() {
            return Err(StoreError::Write {
                key: key.to_string(),
                message: "disk full".into(),
            });
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }
}
