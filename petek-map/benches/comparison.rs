//! Benchmark: petek-map against dashmap and a mutex-wrapped std HashMap.
//!
//! Same workload per contender: each thread inserts its own key range, then
//! reads the whole populated map. foldhash is used as the hasher everywhere
//! so the comparison measures the table, not the hash function.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use foldhash::fast::RandomState as FoldState;
use petek_map::SplitOrderedMap;

const OPS: usize = 10_000;
const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

fn bench_insert_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_comparison");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops = OPS / threads;
        group.throughput(Throughput::Elements((ops * threads) as u64));

        group.bench_with_input(
            BenchmarkId::new("petek-map", threads),
            &(threads, ops),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(SplitOrderedMap::with_hasher(FoldState::default()));
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    map.insert(black_box(tid * ops + i), black_box(i));
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

        group.bench_with_input(
            BenchmarkId::new("dashmap", threads),
            &(threads, ops),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(dashmap::DashMap::with_hasher(FoldState::default()));
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    map.insert(black_box(tid * ops + i), black_box(i));
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

        group.bench_with_input(
            BenchmarkId::new("mutex-hashmap", threads),
            &(threads, ops),
            |b, &(threads, ops)| {
                b.iter(|| {
                    let map = Arc::new(Mutex::new(HashMap::with_hasher(FoldState::default())));
                    let handles: Vec<_> = (0..threads)
                        .map(|tid| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                for i in 0..ops {
                                    map.lock().unwrap().insert(black_box(tid * ops + i), black_box(i));
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

fn bench_read_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_comparison");
    group.sample_size(20);

    for &threads in THREAD_COUNTS {
        let ops = OPS / threads;
        group.throughput(Throughput::Elements((ops * threads) as u64));

        group.bench_with_input(
            BenchmarkId::new("petek-map", threads),
            &(threads, ops),
            |b, &(threads, ops)| {
                let map = Arc::new(SplitOrderedMap::with_hasher(FoldState::default()));
                for i in 0..OPS {
                    map.insert(i, i);
                }
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let mut sum = 0usize;
                                for i in 0..ops {
                                    if let Some(v) = map.get(&black_box(i)) {
                                        sum += v;
                                    }
                                }
                                sum
                            })
                        })
                        .collect();
                    handles.into_iter().map(|h| h.join().unwrap()).sum::<usize>()
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("dashmap", threads),
            &(threads, ops),
            |b, &(threads, ops)| {
                let map = Arc::new(dashmap::DashMap::with_hasher(FoldState::default()));
                for i in 0..OPS {
                    map.insert(i, i);
                }
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let mut sum = 0usize;
                                for i in 0..ops {
                                    if let Some(v) = map.get(&black_box(i)) {
                                        sum += *v;
                                    }
                                }
                                sum
                            })
                        })
                        .collect();
                    handles.into_iter().map(|h| h.join().unwrap()).sum::<usize>()
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex-hashmap", threads),
            &(threads, ops),
            |b, &(threads, ops)| {
                let map = Arc::new(Mutex::new(HashMap::with_hasher(FoldState::default())));
                for i in 0..OPS {
                    map.lock().unwrap().insert(i, i);
                }
                b.iter(|| {
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let map = Arc::clone(&map);
                            thread::spawn(move || {
                                let mut sum = 0usize;
                                for i in 0..ops {
                                    if let Some(v) = map.lock().unwrap().get(&black_box(i)) {
                                        sum += v;
                                    }
                                }
                                sum
                            })
                        })
                        .collect();
                    handles.into_iter().map(|h| h.join().unwrap()).sum::<usize>()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_insert_comparison, bench_read_comparison);
criterion_main!(benches);
