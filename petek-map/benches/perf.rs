//! Benchmark: petek-map throughput across thread counts and workload mixes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use petek_map::SplitOrderedMap;

const SMALL_OPS: usize = 1_000;
const MEDIUM_OPS: usize = 10_000;
const LARGE_OPS: usize = 100_000;

const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

fn bench_single_thread_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_insert");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("petek-map", size), &size, |b, &size| {
            b.iter(|| {
                let map = SplitOrderedMap::new();
                for i in 0..size {
                    map.insert(black_box(i), black_box(i * 2));
                }
                map
            });
        });
    }

    group.finish();
}

fn bench_single_thread_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_get");

    for &size in &[SMALL_OPS, MEDIUM_OPS, LARGE_OPS] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("petek-map", size), &size, |b, &size| {
            let map = SplitOrderedMap::new();
            for i in 0..size {
                map.insert(i, i * 2);
            }
            b.iter(|| {
                let mut sum = 0;
                for i in 0..size {
                    if let Some(v) = map.get(&black_box(i)) {
                        sum += v;
                    }
                }
                sum
            });
        });
    }

    group.finish();
}

fn bench_concurrent_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_insert");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("petek-map", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(SplitOrderedMap::new());
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = tid * ops + i;
                                    map.insert(black_box(key), black_box(key * 2));
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    map
                });
            },
        );
    }

    group.finish();
}

fn bench_concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_reads");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("petek-map", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                let map = Arc::new(SplitOrderedMap::new());
                for i in 0..total_ops {
                    map.insert(i, i * 2);
                }
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let mut sum: usize = 0;
                                for i in 0..ops {
                                    if let Some(v) = map.get(&black_box(i)) {
                                        sum += v;
                                    }
                                }
                                sum
                            })
                        })
                        .collect();
                    let sum: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
                    sum
                });
            },
        );
    }

    group.finish();
}

fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_insert_find_delete");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops_per_thread = MEDIUM_OPS / threads;
        let total_ops = ops_per_thread * threads;
        group.throughput(Throughput::Elements(total_ops as u64));

        group.bench_with_input(
            BenchmarkId::new("petek-map", threads),
            &(threads, ops_per_thread),
            |b, &(threads, ops)| {
                let map = Arc::new(SplitOrderedMap::new());
                for i in 0..total_ops {
                    map.insert(i, i);
                }
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    let key = tid * ops + i;
                                    match i % 10 {
                                        0 => {
                                            map.remove(&black_box(key));
                                        }
                                        1 => {
                                            map.insert(black_box(key), black_box(i));
                                        }
                                        _ => {
                                            let _ = map.get(&black_box(key));
                                        }
                                    }
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_insert,
    bench_single_thread_get,
    bench_concurrent_insert,
    bench_concurrent_reads,
    bench_mixed_workload,
);

criterion_main!(benches);
