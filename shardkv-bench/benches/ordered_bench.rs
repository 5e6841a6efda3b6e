//! Ordered query benchmarks - min, max, count, lower_bound and range scans

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shardkv_bench::config::BenchmarkConfig;
use shardkv_bench::data_gen::{generate_entries, sequential_keys};
use shardkv_bench::stores::{create_inmemory_registry, populate, BenchContext};
use shardkv::Store;
use std::hint::black_box;

fn filled(count: usize, ordered: bool, shards: usize) -> (BenchContext, Store) {
    let ctx = create_inmemory_registry().unwrap();
    let store = ctx.store("bench", ordered, shards).unwrap();
    populate(&store, &generate_entries(count, 32)).unwrap();
    (ctx, store)
}

fn bench_min_max(c: &mut Criterion) {
    let config = BenchmarkConfig::new();
    let mut group = c.benchmark_group("Ordered/MinMax");

    for &count in &config.key_counts {
        for ordered in [true, false] {
            let label = if ordered { "ordered" } else { "hashed" };
            let (_ctx, store) = filled(count, ordered, 4);
            group.bench_with_input(BenchmarkId::new(label, count), &store, |b, store| {
                b.iter(|| black_box((store.min().unwrap(), store.max().unwrap())));
            });
        }
    }

    group.finish();
}

fn bench_count(c: &mut Criterion) {
    let config = BenchmarkConfig::new();
    let mut group = c.benchmark_group("Ordered/Count");

    for &count in &config.key_counts {
        for &shards in &config.shard_counts {
            let (_ctx, store) = filled(count, true, shards);
            let keys = sequential_keys(count);
            let (low, high) = (keys[count / 4].clone(), keys[3 * count / 4].clone());

            group.bench_with_input(
                BenchmarkId::new(format!("{}_shards", shards), count),
                &store,
                |b, store| {
                    b.iter(|| black_box(store.count(&low, &high).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_lower_bound(c: &mut Criterion) {
    let config = BenchmarkConfig::quick();
    let mut group = c.benchmark_group("Ordered/LowerBound");

    for &count in &config.key_counts {
        let (_ctx, store) = filled(count, true, 4);
        let lookups: Vec<Vec<u8>> = sequential_keys(count)
            .into_iter()
            .step_by(10)
            .map(|mut key| {
                key.pop();
                key
            })
            .collect();
        group.throughput(Throughput::Elements(lookups.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &lookups, |b, lookups| {
            b.iter(|| {
                for lookup in lookups {
                    black_box(store.lower_bound(lookup).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_range_scan(c: &mut Criterion) {
    let config = BenchmarkConfig::quick();
    let mut group = c.benchmark_group("Ordered/RangeScan");

    for &count in &config.key_counts {
        for &shards in &config.shard_counts {
            let (_ctx, store) = filled(count, true, shards);
            group.throughput(Throughput::Elements(count as u64));

            group.bench_with_input(
                BenchmarkId::new(format!("{}_shards", shards), count),
                &store,
                |b, store| {
                    b.iter(|| black_box(store.iter().unwrap().count()));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_min_max,
    bench_count,
    bench_lower_bound,
    bench_range_scan
);
criterion_main!(benches);
