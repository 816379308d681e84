use crate::{Memoizer, Result};
use std::sync::Arc;

/// Smallest-factor primality test.
///
/// [`PrimeOracle::check`] returns `0` when the candidate is prime and its
/// smallest factor otherwise. Candidates `<= 1` also return `0`, so `0` doubles
/// as the "prime" marker and the "no factor found" marker.
#[derive(Default, Clone, Copy, Debug)]
pub struct PrimeOracle;

impl PrimeOracle {
    /// Returns the smallest divisor `d` of `n` with `2 <= d <= sqrt(n)`, or `0`
    /// if there is none.
    ///
    /// # Example
    /// ```
    /// use primeflow::PrimeOracle;
    ///
    /// assert_eq!(PrimeOracle::check(17), 0);
    /// assert_eq!(PrimeOracle::check(91), 7);
    /// ```
    pub const fn check(n: u64) -> u64 {
        if n <= 3 {
            return 0;
        }
        if n % 2 == 0 {
            return 2;
        }

        let mut factor = 3;
        // `factor <= n / factor` avoids overflowing `factor * factor` near
        // `u64::MAX`.
        while factor <= n / factor {
            if n % factor == 0 {
                return factor;
            }
            factor += 2;
        }
        0
    }
}

/// The answer a [`PrimeChecker`] gives for one candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    /// Smallest factor, or `0` if prime.
    pub factor: u64,
    /// Whether the factor came from a memoized entry instead of a fresh
    /// computation.
    pub from_cache: bool,
}

impl Verdict {
    pub const fn fresh(factor: u64) -> Self {
        Self {
            factor,
            from_cache: false,
        }
    }
}

/// A source of primality verdicts used by worker tasks.
///
/// This abstraction allows running the pipeline with or without memoization,
/// or with a mocked checker in tests.
pub trait PrimeChecker: Send + Sync {
    /// Evaluates `candidate`.
    ///
    /// # Errors
    ///
    /// Implementations return an error when a verdict cannot be produced, e.g.
    /// [`Error::ClosedCache`] for a memoizer that has been shut down.
    ///
    /// [`Error::ClosedCache`]: crate::Error::ClosedCache
    fn evaluate(&self, candidate: u64) -> Result<Verdict>;
}

impl PrimeChecker for PrimeOracle {
    fn evaluate(&self, candidate: u64) -> Result<Verdict> {
        Ok(Verdict::fresh(Self::check(candidate)))
    }
}

impl<C: PrimeChecker + ?Sized> PrimeChecker for Arc<C> {
    fn evaluate(&self, candidate: u64) -> Result<Verdict> {
        (**self).evaluate(candidate)
    }
}

/// A [`PrimeOracle`] fronted by a shared [`Memoizer`].
///
/// The memoizer is shared rather than owned so the caller can copy or shut it
/// down once a run is over.
#[derive(Clone, Debug)]
pub struct MemoizedOracle {
    memoizer: Arc<Memoizer<u64, u64>>,
}

impl MemoizedOracle {
    pub const fn new(memoizer: Arc<Memoizer<u64, u64>>) -> Self {
        Self { memoizer }
    }

    pub fn memoizer(&self) -> &Arc<Memoizer<u64, u64>> {
        &self.memoizer
    }
}

impl PrimeChecker for MemoizedOracle {
    fn evaluate(&self, candidate: u64) -> Result<Verdict> {
        let memoized = self
            .memoizer
            .get(candidate, |&n| PrimeOracle::check(n))?;
        Ok(Verdict {
            factor: memoized.value,
            from_cache: memoized.from_cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn pins_small_candidates() {
        assert_eq!(PrimeOracle::check(0), 0);
        assert_eq!(PrimeOracle::check(1), 0);
        assert_eq!(PrimeOracle::check(2), 0);
        assert_eq!(PrimeOracle::check(3), 0);
        assert_eq!(PrimeOracle::check(4), 2);
        assert_eq!(PrimeOracle::check(17), 0);
    }

    #[test]
    fn returns_smallest_factor() {
        assert_eq!(PrimeOracle::check(9), 3);
        assert_eq!(PrimeOracle::check(15), 3);
        assert_eq!(PrimeOracle::check(25), 5);
        assert_eq!(PrimeOracle::check(49), 7);
        assert_eq!(PrimeOracle::check(91), 7);
        assert_eq!(PrimeOracle::check(100_000), 2);
        assert_eq!(PrimeOracle::check(10_007 * 10_009), 10_007);
    }

    #[test]
    fn recognizes_primes() {
        for prime in [5, 7, 11, 13, 97, 7919, 104_729, 1_000_000_007] {
            assert_eq!(PrimeOracle::check(prime), 0, "{prime} should be prime");
        }
    }

    #[test]
    fn factor_divides_and_is_minimal() {
        for n in 2..2_000_u64 {
            let factor = PrimeOracle::check(n);
            if factor == 0 {
                assert!((2..n).all(|d| n % d != 0), "{n} reported prime");
            } else {
                assert_eq!(n % factor, 0);
                assert!((2..factor).all(|d| n % d != 0), "{factor} not minimal for {n}");
            }
        }
    }

    #[test]
    fn handles_values_near_u64_max() {
        assert_eq!(PrimeOracle::check(u64::MAX), 3);
        assert_eq!(PrimeOracle::check(u64::MAX - 1), 2);
    }

    #[test]
    fn memoized_oracle_marks_repeats_as_cached() {
        let memoizer = Arc::new(Memoizer::new());
        let oracle = MemoizedOracle::new(Arc::clone(&memoizer));

        let first = oracle.evaluate(91).unwrap();
        let second = oracle.evaluate(91).unwrap();

        assert_eq!(first, Verdict::fresh(7));
        assert_eq!(
            second,
            Verdict {
                factor: 7,
                from_cache: true
            }
        );
        assert_eq!(memoizer.size(), 1);
    }

    #[test]
    fn memoized_oracle_fails_after_shutdown() {
        let memoizer = Arc::new(Memoizer::new());
        let oracle = MemoizedOracle::new(Arc::clone(&memoizer));
        memoizer.shutdown();

        assert_eq!(oracle.evaluate(11), Err(Error::ClosedCache));
    }
}
