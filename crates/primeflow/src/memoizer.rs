//! At-most-once memoization of an expensive function.
//!
//! [`Memoizer`] maps each key to either a pending computation or a completed
//! value. The first caller for a key becomes the *leader*: it inserts a
//! pending marker, runs the computation outside the lock, and publishes the
//! value. Callers arriving while the leader is still running park on that
//! key's condition variable instead of polling or computing again.
//!
//! Different keys never contend beyond the short critical section that
//! inspects the map, so their computations run fully in parallel.

#[cfg(test)]
mod tests;

use crate::{Error, Result};
use core::{fmt, hash::Hash};
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicU64, Ordering};
use std::{collections::HashMap, sync::Arc};

#[cfg(feature = "cache-padded")]
type Counter = crossbeam_utils::CachePadded<AtomicU64>;
#[cfg(not(feature = "cache-padded"))]
type Counter = AtomicU64;

fn counter() -> Counter {
    #[cfg(feature = "cache-padded")]
    return crossbeam_utils::CachePadded::new(AtomicU64::new(0));
    #[cfg(not(feature = "cache-padded"))]
    return AtomicU64::new(0);
}

/// A value returned by [`Memoizer::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Memoized<V> {
    pub value: V,
    /// `true` unless this call ran the computation itself.
    pub from_cache: bool,
}

impl<V> Memoized<V> {
    const fn fresh(value: V) -> Self {
        Self {
            value,
            from_cache: false,
        }
    }

    const fn cached(value: V) -> Self {
        Self {
            value,
            from_cache: true,
        }
    }
}

/// Hit/miss counters of a [`Memoizer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    /// Lookups answered without running the computation (including callers
    /// that waited on an in-flight computation).
    pub hits: u64,
    /// Lookups that ran the computation.
    pub misses: u64,
}

enum Slot<V> {
    Pending(Arc<Inflight<V>>),
    Ready(V),
}

enum InflightState<V> {
    Computing,
    Ready(V),
    Abandoned,
}

struct Inflight<V> {
    state: Mutex<InflightState<V>>,
    done: Condvar,
}

impl<V: Clone> Inflight<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(InflightState::Computing),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<V> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                InflightState::Computing => self.done.wait(&mut state),
                InflightState::Ready(value) => return Ok(value.clone()),
                InflightState::Abandoned => {
                    return Err(Error::Computation {
                        reason: "memoized computation panicked".to_string(),
                    });
                }
            }
        }
    }

    fn settle(&self, outcome: InflightState<V>) {
        *self.state.lock() = outcome;
        self.done.notify_all();
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, Slot<V>>,
    closed: bool,
}

enum Lookup<V> {
    Hit(V),
    Wait(Arc<Inflight<V>>),
    Miss,
}

/// Withdraws a pending entry and releases its waiters if the leader unwinds
/// before publishing a value.
struct PendingGuard<'a, K: Eq + Hash, V: Clone> {
    state: &'a Mutex<CacheState<K, V>>,
    key: &'a K,
    inflight: &'a Arc<Inflight<V>>,
    published: bool,
}

impl<K: Eq + Hash, V: Clone> Drop for PendingGuard<'_, K, V> {
    fn drop(&mut self) {
        if self.published {
            return;
        }

        let mut state = self.state.lock();
        let ours = matches!(
            state.entries.get(self.key),
            Some(Slot::Pending(pending)) if Arc::ptr_eq(pending, self.inflight)
        );
        if ours {
            state.entries.remove(self.key);
        }
        drop(state);

        self.inflight.settle(InflightState::Abandoned);
    }
}

/// A thread-safe cache that runs a computation at most once per key.
///
/// ## Lifecycle
/// - Entries are created on the first lookup of a key and are never evicted.
/// - [`Memoizer::shutdown`] clears every entry and closes the cache; all later
///   lookups fail with [`Error::ClosedCache`]. Computations already running
///   still hand their value to the callers waiting on them.
///
/// # Example
/// ```
/// use primeflow::{Memoizer, PrimeOracle};
///
/// let memoizer = Memoizer::new();
/// let first = memoizer.get(91, |&n| PrimeOracle::check(n)).unwrap();
/// let again = memoizer.get(91, |_| unreachable!()).unwrap();
///
/// assert_eq!((first.value, first.from_cache), (7, false));
/// assert_eq!((again.value, again.from_cache), (7, true));
/// ```
pub struct Memoizer<K, V> {
    state: Mutex<CacheState<K, V>>,
    hits: Counter,
    misses: Counter,
}

impl<K, V> Memoizer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                closed: false,
            }),
            hits: counter(),
            misses: counter(),
        }
    }

    /// Returns the value for `key`, running `compute` only if no value exists
    /// and no other caller is computing it.
    ///
    /// A caller that finds the key in flight blocks until the leader publishes
    /// the value.
    ///
    /// # Errors
    ///
    /// - [`Error::ClosedCache`] if the memoizer has been shut down.
    /// - [`Error::Computation`] if this caller waited on a leader whose
    ///   computation panicked.
    pub fn get<F>(&self, key: K, compute: F) -> Result<Memoized<V>>
    where
        F: FnOnce(&K) -> V,
    {
        let inflight = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::ClosedCache);
            }

            let lookup = match state.entries.get(&key) {
                Some(Slot::Ready(value)) => Lookup::Hit(value.clone()),
                Some(Slot::Pending(pending)) => Lookup::Wait(Arc::clone(pending)),
                None => Lookup::Miss,
            };

            match lookup {
                Lookup::Hit(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Memoized::cached(value));
                }
                Lookup::Wait(pending) => {
                    drop(state);
                    let value = pending.wait()?;
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Memoized::cached(value));
                }
                Lookup::Miss => {
                    let inflight = Arc::new(Inflight::new());
                    state
                        .entries
                        .insert(key.clone(), Slot::Pending(Arc::clone(&inflight)));
                    inflight
                }
            }
        };

        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut guard = PendingGuard {
            state: &self.state,
            key: &key,
            inflight: &inflight,
            published: false,
        };
        let value = compute(&key);
        guard.published = true;
        drop(guard);

        {
            let mut state = self.state.lock();
            // A shutdown that raced with this computation already cleared the
            // map; do not resurrect the entry.
            if !state.closed {
                state.entries.insert(key, Slot::Ready(value.clone()));
            }
        }
        inflight.settle(InflightState::Ready(value.clone()));

        Ok(Memoized::fresh(value))
    }

    /// Clears all entries and rejects every later [`Memoizer::get`].
    ///
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the number of entries, pending ones included.
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Copies every completed entry.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.state
            .lock()
            .entries
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready(value) => Some((key.clone(), value.clone())),
                Slot::Pending(_) => None,
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Default for Memoizer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Memoizer<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Memoizer")
            .field("entries", &state.entries.len())
            .field("closed", &state.closed)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}
