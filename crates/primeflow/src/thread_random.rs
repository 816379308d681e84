use crate::RandSource;
use core::ops::RangeInclusive;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rng, rngs::StdRng};

/// A `RandSource` that uses the thread-local RNG (`rand::rng()`).
///
/// Each OS thread has its own RNG instance, so calls from multiple threads are
/// contention-free. This type does **not** store the RNG itself; it simply
/// accesses the thread-local generator on each call.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource for ThreadRandom {
    fn rand_in(&self, range: RangeInclusive<u64>) -> u64 {
        rng().random_range(range)
    }
}

/// A `RandSource` seeded once, yielding the same sequence on every run with
/// the same seed.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandSource for SeededRandom {
    fn rand_in(&self, range: RangeInclusive<u64>) -> u64 {
        self.rng.lock().random_range(range)
    }
}
