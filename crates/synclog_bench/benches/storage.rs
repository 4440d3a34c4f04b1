//! Store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use synclog_bench::json_document;
use synclog_storage::{FileStoreProvider, InMemoryStoreProvider, Store, StoreOptions, StoreProvider};
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Benchmark in-memory upserts.
fn bench_memory_upsert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_upsert");

    for fields in [4, 64, 512].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(fields), fields, |b, &fields| {
            let provider = InMemoryStoreProvider::new();
            let store = rt
                .block_on(provider.open_store("bench", StoreOptions::default()))
                .unwrap();
            let value = json_document(fields);
            let mut n = 0u64;

            b.to_async(&rt).iter(|| {
                n += 1;
                let store = store.clone();
                let value = value.clone();
                let key = n.to_string();
                async move {
                    store
                        .upsert(&key, json!({}), black_box(value))
                        .await
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark in-memory key lookups.
fn bench_memory_find(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_find");

    for count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let provider = InMemoryStoreProvider::new();
            let store = rt.block_on(async {
                let store = provider
                    .open_store("bench", StoreOptions::default())
                    .await
                    .unwrap();
                for i in 0..count {
                    store
                        .upsert(&i.to_string(), json!({}), json!({"n": i}))
                        .await
                        .unwrap();
                }
                store
            });
            let key = (count / 2).to_string();

            b.to_async(&rt).iter(|| {
                let store = store.clone();
                let key = key.clone();
                async move {
                    let value = store.find_by_key(black_box(&key)).await.unwrap();
                    black_box(value);
                }
            });
        });
    }

    group.finish();
}

/// Benchmark durable file-store upserts.
fn bench_file_upsert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("file_upsert");

    // fsync per write
    group.sample_size(20);

    for fields in [4, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(fields), fields, |b, &fields| {
            let temp_dir = TempDir::new().unwrap();
            let store = rt.block_on(async {
                let provider = FileStoreProvider::open(temp_dir.path()).await.unwrap();
                provider
                    .open_store("bench", StoreOptions::default())
                    .await
                    .unwrap()
            });
            let value = json_document(fields);
            let mut n = 0u64;

            b.to_async(&rt).iter(|| {
                n += 1;
                let store = store.clone();
                let value = value.clone();
                let key = n.to_string();
                async move {
                    store.upsert(&key, json!({}), value).await.unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark file-store reopen, which replays the whole log.
fn bench_file_reopen(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("file_reopen");
    group.sample_size(20);

    for count in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let temp_dir = TempDir::new().unwrap();
            rt.block_on(async {
                let provider = FileStoreProvider::open(temp_dir.path()).await.unwrap();
                let store = provider
                    .open_store("bench", StoreOptions::default())
                    .await
                    .unwrap();
                for i in 0..count {
                    store
                        .upsert(&i.to_string(), json!({}), json!({"n": i}))
                        .await
                        .unwrap();
                }
            });

            b.to_async(&rt).iter(|| {
                let root = temp_dir.path().to_path_buf();
                async move {
                    let provider = FileStoreProvider::open(root).await.unwrap();
                    let store = provider
                        .open_store("bench", StoreOptions::default())
                        .await
                        .unwrap();
                    black_box(store.keys().await.unwrap().len());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_memory_upsert,
    bench_memory_find,
    bench_file_upsert,
    bench_file_reopen,
);
criterion_main!(benches);
