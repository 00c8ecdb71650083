//! # Flowline Stream Benchmarks
//!
//! Throughput of the hot paths:
//!
//! | Pipeline | What it stresses |
//! |----------|------------------|
//! | `from_iter` | source drain loop and demand accounting |
//! | `map_filter` | synchronous stage forwarding |
//! | `flat_map` | merge queueing, inner replenishment, outer refill |
//! | `concat_map` | inner switching and demand hand-over |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flowline_engine::{Collector, FlatMapConfig, Multi};
use std::time::Duration;

const SIZES: [i64; 3] = [1_000, 10_000, 100_000];

fn bench_from_iter(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_iter");
    group.measurement_time(Duration::from_secs(5));

    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("count", size), &size, |b, &size| {
            b.iter(|| {
                let count = Multi::range(0, size)
                    .collect(Collector::counting())
                    .blocking_get();
                black_box(count)
            })
        });
        group.bench_with_input(BenchmarkId::new("map_filter", size), &size, |b, &size| {
            b.iter(|| {
                let count = Multi::range(0, size)
                    .map(|x| x.wrapping_mul(31))
                    .filter(|x| x % 3 == 0)
                    .collect(Collector::counting())
                    .blocking_get();
                black_box(count)
            })
        });
    }

    group.finish();
}

fn bench_flat_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_map");
    group.measurement_time(Duration::from_secs(5));

    let outer = 1_000;
    for inner in [1, 10, 100] {
        group.throughput(Throughput::Elements((outer * inner) as u64));
        for concurrency in [1, 32] {
            let config = FlatMapConfig::default().with_max_concurrency(concurrency);
            group.bench_with_input(
                BenchmarkId::new(format!("concurrency_{concurrency}"), inner),
                &inner,
                |b, &inner| {
                    b.iter(|| {
                        let count = Multi::range(0, outer)
                            .flat_map_with(move |x| Multi::range(x, inner), config)
                            .collect(Collector::counting())
                            .blocking_get();
                        black_box(count)
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_concat_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("concat_map");
    group.measurement_time(Duration::from_secs(5));

    let outer = 1_000;
    for inner in [1, 10, 100] {
        group.throughput(Throughput::Elements((outer * inner) as u64));
        group.bench_with_input(BenchmarkId::new("sequential", inner), &inner, |b, &inner| {
            b.iter(|| {
                let count = Multi::range(0, outer)
                    .concat_map(move |x| Multi::range(x, inner))
                    .collect(Collector::counting())
                    .blocking_get();
                black_box(count)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_from_iter, bench_flat_map, bench_concat_map);
criterion_main!(benches);
