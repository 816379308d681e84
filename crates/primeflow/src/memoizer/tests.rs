use crate::{CacheStats, Error, Memoizer, PrimeOracle};
use std::{
    collections::HashSet,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{scope, sleep},
    time::Duration,
};

#[test]
fn second_lookup_is_cached_and_skips_compute() {
    let memoizer = Memoizer::new();
    let calls = AtomicUsize::new(0);
    let compute = |n: &u64| {
        calls.fetch_add(1, Ordering::SeqCst);
        PrimeOracle::check(*n)
    };

    let first = memoizer.get(221, compute).unwrap();
    let second = memoizer.get(221, compute).unwrap();

    assert_eq!(first.value, 13);
    assert!(!first.from_cache);
    assert_eq!(second.value, 13);
    assert!(second.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(memoizer.stats(), CacheStats { hits: 1, misses: 1 });
}

#[test]
fn concurrent_lookups_for_one_key_compute_once() {
    const THREADS: usize = 16;

    let memoizer = Memoizer::new();
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);
    let (memoizer, calls, barrier) = (&memoizer, &calls, &barrier);

    let results = scope(|s| {
        let mut handles = Vec::with_capacity(THREADS);
        for _ in 0..THREADS {
            handles.push(s.spawn(move || {
                barrier.wait();
                memoizer
                    .get(1_000_003_u64, |&n| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Hold the key in flight long enough for every other
                        // thread to find it pending.
                        sleep(Duration::from_millis(50));
                        PrimeOracle::check(n)
                    })
                    .unwrap()
            }));
        }
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.iter().filter(|r| !r.from_cache).count(), 1);
    assert!(results.iter().all(|r| r.value == 0));
    assert_eq!(memoizer.size(), 1);
}

#[test]
fn distinct_keys_compute_in_parallel() {
    const THREADS: usize = 4;

    let memoizer = Memoizer::new();
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);

    scope(|s| {
        for key in 0..THREADS as u64 {
            let memoizer = &memoizer;
            let active = &active;
            let peak = &peak;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                memoizer
                    .get(key, |&k| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(100));
                        active.fetch_sub(1, Ordering::SeqCst);
                        k
                    })
                    .unwrap();
            });
        }
    });

    assert!(
        peak.load(Ordering::SeqCst) > 1,
        "computations for different keys were serialized"
    );
    assert_eq!(memoizer.size(), THREADS);
}

#[test]
fn shutdown_clears_and_rejects_lookups() {
    let memoizer = Memoizer::new();
    for n in [4_u64, 9, 11] {
        memoizer.get(n, |&n| PrimeOracle::check(n)).unwrap();
    }
    assert_eq!(memoizer.size(), 3);

    memoizer.shutdown();

    assert!(memoizer.is_closed());
    assert_eq!(memoizer.size(), 0);
    assert_eq!(
        memoizer.get(4, |&n| PrimeOracle::check(n)),
        Err(Error::ClosedCache)
    );

    // Idempotent.
    memoizer.shutdown();
    assert_eq!(memoizer.size(), 0);
}

#[test]
fn snapshot_copies_completed_entries() {
    let memoizer = Memoizer::new();
    for n in [15_u64, 17, 21] {
        memoizer.get(n, |&n| PrimeOracle::check(n)).unwrap();
    }

    let copy = memoizer.snapshot();
    memoizer.shutdown();

    assert_eq!(copy.len(), 3);
    assert_eq!(copy[&15], 3);
    assert_eq!(copy[&17], 0);
    assert_eq!(copy[&21], 3);
}

#[test]
fn panicking_computation_releases_waiters() {
    let memoizer = Memoizer::<u64, u64>::new();
    let started = Barrier::new(2);
    let (memoizer_ref, started_ref) = (&memoizer, &started);

    scope(|s| {
        let leader = s.spawn(move || {
            let (memoizer, started) = (memoizer_ref, started_ref);
            catch_unwind(AssertUnwindSafe(|| {
                memoizer.get(7, |_| {
                    started.wait();
                    sleep(Duration::from_millis(50));
                    panic!("boom");
                })
            }))
        });

        started.wait();
        let waiter = memoizer.get(7, |_| unreachable!("leader is still in flight"));

        assert!(leader.join().unwrap().is_err());
        assert!(matches!(waiter, Err(Error::Computation { .. })));
    });

    // The pending marker was withdrawn, so the key can be computed again.
    assert_eq!(memoizer.size(), 0);
    let retry = memoizer.get(7, |&n| PrimeOracle::check(n)).unwrap();
    assert_eq!(retry.value, 0);
    assert!(!retry.from_cache);
}

#[test]
fn shutdown_during_computation_does_not_resurrect_entry() {
    let memoizer = Memoizer::<u64, u64>::new();
    let started = Barrier::new(2);
    let (memoizer_ref, started_ref) = (&memoizer, &started);

    scope(|s| {
        let leader = s.spawn(move || {
            memoizer_ref.get(33, |&n| {
                started_ref.wait();
                sleep(Duration::from_millis(50));
                PrimeOracle::check(n)
            })
        });

        started.wait();
        memoizer.shutdown();

        let result = leader.join().unwrap().unwrap();
        assert_eq!(result.value, 3);
    });

    assert_eq!(memoizer.size(), 0);
    assert!(memoizer.snapshot().is_empty());
}

#[test]
fn many_keys_many_threads_each_computed_once() {
    const THREADS: usize = 8;
    const KEYS: u64 = 64;

    let memoizer = Memoizer::new();
    let computed = parking_lot::Mutex::new(Vec::new());
    let (memoizer_ref, computed_ref) = (&memoizer, &computed);

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(move || {
                let (memoizer, computed) = (memoizer_ref, computed_ref);
                for key in 0..KEYS {
                    memoizer
                        .get(key, |&k| {
                            computed.lock().push(k);
                            PrimeOracle::check(k)
                        })
                        .unwrap();
                }
            });
        }
    });

    let computed = computed.into_inner();
    let unique: HashSet<_> = computed.iter().copied().collect();
    assert_eq!(computed.len(), KEYS as usize);
    assert_eq!(unique.len(), KEYS as usize);

    let stats = memoizer.stats();
    assert_eq!(stats.misses, KEYS);
    assert_eq!(stats.hits, KEYS * (THREADS as u64 - 1));
}
