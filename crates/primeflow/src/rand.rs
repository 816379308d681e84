use core::ops::RangeInclusive;

/// A trait for random sources that produce candidate integers.
///
/// This abstraction allows you to plug in a real random source or a seeded
/// one for reproducible runs and tests.
///
/// # Example
/// ```
/// use core::ops::RangeInclusive;
/// use primeflow::RandSource;
///
/// struct FixedRand;
/// impl RandSource for FixedRand {
///     fn rand_in(&self, range: RangeInclusive<u64>) -> u64 {
///         *range.start()
///     }
/// }
///
/// let rng = FixedRand;
/// assert_eq!(rng.rand_in(2..=100), 2);
/// ```
pub trait RandSource: Send + Sync {
    /// Returns an integer drawn from `range` (inclusive on both ends).
    fn rand_in(&self, range: RangeInclusive<u64>) -> u64;
}
