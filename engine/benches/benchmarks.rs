//! Performance benchmarks for nexus-sync

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nexus_sync::{
    snapshot, Capabilities, DeletedIdLog, EngineConfig, Field, Fields, LocalStore, MemoryStore,
    Reconciler, Record, RemoteError, RemoteService, SyncEngine,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn fields() -> Fields<Value> {
    Fields::new(Field::json("id"), Field::json("mod"))
}

fn record(i: usize, day: usize) -> Record<Value> {
    Record::new(json!({
        "id": format!("rec_{i}"),
        "mod": format!("2024-01-{:02} 12:00:00", day % 28 + 1),
        "title": format!("Record {i}"),
    }))
}

/// Remote copy of `size` records, and a local copy where every tenth record
/// is newer, every tenth is missing and a few are offline creates.
fn snapshots(size: usize) -> (Vec<Record<Value>>, Vec<Record<Value>>) {
    let remote: Vec<_> = (0..size).map(|i| record(i, 1)).collect();
    let mut local = Vec::with_capacity(size);
    for i in 0..size {
        match i % 10 {
            0 => local.push(record(i, 5)),
            1 => {}
            _ => local.push(record(i, 1)),
        }
    }
    for i in 0..size / 20 {
        let mut created = record(size + i, 3);
        created.created_offline = true;
        local.push(created);
    }
    (local, remote)
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let fields = fields();

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("mixed", size), size, |b, &size| {
            let (local, remote) = snapshots(size);
            let deleted: DeletedIdLog = (0..size / 50)
                .map(|i| format!("rec_{}", i * 50 + 1))
                .collect();

            b.iter(|| {
                Reconciler::new(&fields).reconcile(
                    black_box(local.clone()),
                    black_box(remote.clone()),
                    black_box(&deleted),
                )
            })
        });

        group.bench_with_input(BenchmarkId::new("bootstrap", size), size, |b, &size| {
            let (_, remote) = snapshots(size);
            let deleted = DeletedIdLog::new();

            b.iter(|| {
                Reconciler::new(&fields).reconcile(
                    black_box(Vec::new()),
                    black_box(remote.clone()),
                    black_box(&deleted),
                )
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 1000, 10000].iter() {
        let (local, _) = snapshots(*size);
        let encoded = snapshot::to_json(&local).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", size), &local, |b, local| {
            b.iter(|| snapshot::to_json(black_box(local)))
        });

        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| snapshot::from_json::<Value>(black_box(encoded)))
        });
    }

    group.finish();
}

/// Remote that answers immediately.
struct EchoRemote {
    records: Vec<Value>,
}

#[async_trait]
impl RemoteService<Value> for EchoRemote {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn fetch_all(&self) -> Result<Vec<Value>, RemoteError> {
        Ok(self.records.clone())
    }

    async fn create(&self, item: &Value) -> Result<Value, RemoteError> {
        Ok(item.clone())
    }

    async fn update(&self, item: &Value) -> Result<Value, RemoteError> {
        Ok(item.clone())
    }

    async fn delete(&self, id: &str) -> Result<String, RemoteError> {
        Ok(id.to_string())
    }
}

fn bench_sync_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_cycle");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("fetch_and_cascade", size), size, |b, &size| {
            let (local, remote) = snapshots(size);
            let local_json = snapshot::to_json(&local).unwrap();
            let remote: Vec<Value> = remote.into_iter().map(Record::into_payload).collect();

            b.to_async(&runtime).iter(|| {
                let local_json = local_json.clone();
                let remote = remote.clone();
                async move {
                    let store = Arc::new(MemoryStore::new());
                    store.set("bench", local_json).await.unwrap();
                    let config = EngineConfig::new("bench")
                        .id_field(Field::json("id"))
                        .modified_field(Field::json("mod"));
                    let remote: Arc<dyn RemoteService<Value>> =
                        Arc::new(EchoRemote { records: remote });
                    let engine = SyncEngine::new(config, store, Some(remote));
                    engine.set_online(true);
                    engine.fetch_remote().await
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile, bench_snapshot, bench_sync_cycle);
criterion_main!(benches);
