//! Eviction benchmarks - writes under a memory ceiling and defragmentation

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shardkv::{EvictionPolicy, Registry};
use shardkv_bench::config::StoreType;
use shardkv_bench::data_gen::generate_entries;
use shardkv_bench::stores::{create_inmemory_registry, create_registry_with, populate};
use std::hint::black_box;

fn bench_put_under_ceiling(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut group = c.benchmark_group("Eviction/Put");
    group.sample_size(10);

    let entries = generate_entries(50_000, 64);
    group.throughput(Throughput::Elements(entries.len() as u64));

    for policy in [EvictionPolicy::NoEviction, EvictionPolicy::AllKeysLru] {
        group.bench_with_input(
            BenchmarkId::new(policy.as_str(), entries.len()),
            &entries,
            |b, entries| {
                b.iter_with_setup(
                    || {
                        let builder = Registry::builder()
                            .max_memory_bytes(1024 * 1024)
                            .eviction_policy(policy);
                        let ctx = create_registry_with(StoreType::InMemory, builder).unwrap();
                        let store = ctx.store("cache", true, 4).unwrap();
                        (ctx, store)
                    },
                    |(ctx, store)| {
                        populate(&store, entries).unwrap();
                        black_box(ctx.registry().stats().unwrap().keys_evicted)
                    },
                );
            },
        );
    }

    group.finish();
}

fn bench_defragment(c: &mut Criterion) {
    let mut group = c.benchmark_group("Eviction/Defragment");
    group.sample_size(10);

    let entries = generate_entries(50_000, 100);
    group.bench_function("keep_every_10th", |b| {
        b.iter_with_setup(
            || {
                let ctx = create_inmemory_registry().unwrap();
                let store = ctx.store("sparse", true, 4).unwrap();
                populate(&store, &entries).unwrap();
                for (i, (key, _)) in entries.iter().enumerate() {
                    if i % 10 != 0 {
                        store.remove(key).unwrap();
                    }
                }
                (ctx, store)
            },
            |(_ctx, store)| black_box(store.defragment().unwrap()),
        );
    });

    group.finish();
}

criterion_group!(benches, bench_put_under_ceiling, bench_defragment);
criterion_main!(benches);
