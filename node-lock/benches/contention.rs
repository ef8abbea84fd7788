use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use node_lock::{IsolationLevel, LockConfig, LockManager, ResourceLock, StripedLockTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::Runtime;

const THREADS: usize = 4;
const OPS_PER_THREAD: usize = 500;
const KEYS: usize = 64;
const TIMEOUT: Duration = Duration::from_secs(10);

// === One hot node, every isolation level ===

fn bench_isolation_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("isolation_levels");

    for level in IsolationLevel::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| {
                let lock: ResourceLock<usize> = ResourceLock::new("/hot", level);
                let value = AtomicU64::new(0);
                thread::scope(|s| {
                    for id in 0..THREADS {
                        let (lock, value) = (&lock, &value);
                        s.spawn(move || {
                            for op in 0..OPS_PER_THREAD {
                                // One write in eight.
                                if op % 8 == 0 {
                                    lock.acquire_write(&id, TIMEOUT).unwrap();
                                    value.fetch_add(1, Ordering::Relaxed);
                                } else {
                                    lock.acquire_read(&id, TIMEOUT).unwrap();
                                    black_box(value.load(Ordering::Relaxed));
                                }
                                lock.release(&id);
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

// === Read then upgrade on a shared node ===

fn bench_upgrade(c: &mut Criterion) {
    let mut group = c.benchmark_group("upgrade");

    for level in [IsolationLevel::ReadCommitted, IsolationLevel::RepeatableRead] {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            b.iter(|| {
                let lock: ResourceLock<usize> = ResourceLock::new("/upgrade", level);
                thread::scope(|s| {
                    for id in 0..THREADS {
                        let lock = &lock;
                        s.spawn(move || {
                            for _ in 0..OPS_PER_THREAD / 4 {
                                lock.acquire_read(&id, TIMEOUT).unwrap();
                                // Losers of a contended upgrade hold nothing.
                                if lock.acquire_write(&id, TIMEOUT).is_ok() {
                                    lock.release(&id);
                                }
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

// === Many keys: per-resource locks vs striping ===

fn bench_write_many_keys(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let keys: Arc<Vec<String>> = Arc::new((0..KEYS).map(|i| format!("/store/{i}")).collect());
    let mut group = c.benchmark_group("write_many_keys");

    // One lock per key, created on demand
    group.bench_function("per_resource", |b| {
        b.iter(|| {
            let locks: LockManager<usize> = LockManager::new(LockConfig::default());
            thread::scope(|s| {
                for id in 0..THREADS {
                    let (locks, keys) = (&locks, &keys);
                    s.spawn(move || {
                        for op in 0..OPS_PER_THREAD {
                            let key = &keys[(op * 7 + id) % KEYS];
                            locks.acquire_write(key, &id, TIMEOUT).unwrap();
                            locks.release(key, &id);
                        }
                    });
                }
            });
        });
    });

    // Fixed table, thread-affine holds
    group.bench_function("striped_blocking", |b| {
        b.iter(|| {
            let table = StripedLockTable::default();
            thread::scope(|s| {
                for id in 0..THREADS {
                    let (table, keys) = (&table, &keys);
                    s.spawn(move || {
                        for op in 0..OPS_PER_THREAD {
                            let key = keys[(op * 7 + id) % KEYS].as_str();
                            table.acquire(key, true).unwrap();
                            table.release(key);
                        }
                    });
                }
            });
        });
    });

    // Fixed table, scoped guards from async tasks
    group.bench_function("striped_async", |b| {
        b.to_async(&rt).iter(|| async {
            let table = Arc::new(StripedLockTable::default());
            let mut handles = vec![];
            for id in 0..THREADS {
                let (table, keys) = (table.clone(), keys.clone());
                handles.push(tokio::spawn(async move {
                    for op in 0..OPS_PER_THREAD {
                        let _guard = table.write(keys[(op * 7 + id) % KEYS].as_str()).await;
                    }
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_isolation_levels, bench_upgrade, bench_write_many_keys);
criterion_main!(benches);
