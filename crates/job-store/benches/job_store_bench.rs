//! Benchmarks for the in-memory job store hot paths.

use criterion::{Criterion, criterion_group, criterion_main};
use job_store::{DEFAULT_QUEUE, InMemoryJobStore, JobStore, NewJob};
use serde_json::json;
use tokio::runtime::Runtime;

fn bench_enqueue(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = InMemoryJobStore::new();

    c.bench_function("enqueue", |b| {
        b.to_async(&rt).iter(|| async {
            store
                .enqueue(NewJob::new("notify", json!({"user": 1})))
                .await
                .unwrap()
        });
    });
}

fn bench_claim_from_backlog(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = InMemoryJobStore::new();

    rt.block_on(async {
        for i in 0..1_000 {
            store
                .enqueue(NewJob::new("sync_target", json!({"i": i})))
                .await
                .unwrap();
        }
    });

    c.bench_function("claim_from_backlog_1000", |b| {
        b.to_async(&rt)
            .iter(|| async { store.claim(DEFAULT_QUEUE, "bench-worker").await.unwrap() });
    });
}

criterion_group!(benches, bench_enqueue, bench_claim_from_backlog);
criterion_main!(benches);
