//! Demand accounting between a publisher and a subscriber.
//!
//! Demand is the number of items the subscriber has authorized and not yet
//! finished consuming. Each unit of demand also yields one delivery *permit*
//! for the publisher; a publisher must claim a permit before it emits a
//! demand-backed item. Permits are claimed on emission, demand is consumed
//! once a worker has processed the item, so the unclaimed permit count never
//! exceeds the outstanding demand.
//!
//! ## Hybrid push/pull
//!
//! The subscriber pulls in batches of `refill_batch` whenever the outstanding
//! demand falls to `low_water_mark` or below, and the publisher pushes freely
//! within a batch. In steady state the outstanding demand stays between
//! `low_water_mark` and `low_water_mark + refill_batch`.

use crate::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct DemandState {
    remaining: u64,
    unclaimed: u64,
}

/// Tracks outstanding demand and the low-water-mark replenishment rule.
///
/// # Example
/// ```
/// use primeflow::DemandController;
///
/// let demand = DemandController::new(2, 4).unwrap();
/// demand.request(4).unwrap();
/// assert!(demand.try_claim());
///
/// demand.consume(1).unwrap();
/// assert_eq!(demand.remaining(), 3);
/// assert_eq!(demand.replenish(), None);
///
/// demand.consume(1).unwrap();
/// assert_eq!(demand.replenish(), Some(4));
/// assert_eq!(demand.remaining(), 6);
/// ```
#[derive(Debug)]
pub struct DemandController {
    state: Mutex<DemandState>,
    granted: Notify,
    low_water_mark: u64,
    refill_batch: u64,
}

impl DemandController {
    /// Creates a controller with no outstanding demand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDemand`] if `refill_batch` is zero, since a
    /// zero refill could never replenish demand.
    pub fn new(low_water_mark: u64, refill_batch: u64) -> Result<Self> {
        if refill_batch == 0 {
            return Err(Error::InvalidDemand { requested: 0 });
        }

        Ok(Self {
            state: Mutex::new(DemandState::default()),
            granted: Notify::new(),
            low_water_mark,
            refill_batch,
        })
    }

    pub const fn low_water_mark(&self) -> u64 {
        self.low_water_mark
    }

    pub const fn refill_batch(&self) -> u64 {
        self.refill_batch
    }

    /// Authorizes `n` more items and returns the new outstanding demand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDemand`] if `n` is zero or the demand counter
    /// would overflow. Demand is left unchanged.
    pub fn request(&self, n: u64) -> Result<u64> {
        let mut state = self.state.lock();
        let remaining = Self::grant(&mut state, n)?;
        drop(state);

        self.granted.notify_one();
        Ok(remaining)
    }

    /// Marks `n` items as consumed and returns the new outstanding demand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DemandUnderflow`] if `n` exceeds the outstanding
    /// demand. Demand is left unchanged.
    pub fn consume(&self, n: u64) -> Result<u64> {
        let mut state = self.state.lock();
        let remaining = state
            .remaining
            .checked_sub(n)
            .ok_or(Error::DemandUnderflow {
                requested: n,
                remaining: state.remaining,
            })?;

        state.remaining = remaining;
        state.unclaimed = state.unclaimed.min(remaining);
        Ok(remaining)
    }

    pub fn remaining(&self) -> u64 {
        self.state.lock().remaining
    }

    /// Permits granted to the publisher and not yet claimed.
    pub fn unclaimed(&self) -> u64 {
        self.state.lock().unclaimed
    }

    /// Returns `true` if the outstanding demand is at or below the low-water
    /// mark.
    pub fn needs_refill(&self) -> bool {
        self.state.lock().remaining <= self.low_water_mark
    }

    /// Requests another batch if the outstanding demand is at or below the
    /// low-water mark.
    ///
    /// The check and the request happen under one lock, so concurrent
    /// consumers that cross the mark together issue a single batch.
    pub fn replenish(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.remaining > self.low_water_mark {
            return None;
        }
        Self::grant(&mut state, self.refill_batch).ok()?;
        drop(state);

        self.granted.notify_one();
        Some(self.refill_batch)
    }

    /// Claims one delivery permit without waiting.
    pub fn try_claim(&self) -> bool {
        let mut state = self.state.lock();
        if state.unclaimed == 0 {
            return false;
        }
        state.unclaimed -= 1;
        true
    }

    /// Waits until a delivery permit is available and claims it.
    ///
    /// Meant for a single publisher task; a grant made while nobody waits is
    /// remembered, so the wakeup cannot be lost between the check and the
    /// wait.
    pub async fn claim(&self) {
        loop {
            if self.try_claim() {
                return;
            }
            self.granted.notified().await;
        }
    }

    fn grant(state: &mut DemandState, n: u64) -> Result<u64> {
        if n == 0 {
            return Err(Error::InvalidDemand { requested: n });
        }
        let remaining = state
            .remaining
            .checked_add(n)
            .ok_or(Error::InvalidDemand { requested: n })?;
        let unclaimed = state
            .unclaimed
            .checked_add(n)
            .ok_or(Error::InvalidDemand { requested: n })?;

        state.remaining = remaining;
        state.unclaimed = unclaimed;
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread::scope, time::Duration};

    #[test]
    fn request_adds_to_remaining() {
        let demand = DemandController::new(5, 10).unwrap();
        assert_eq!(demand.remaining(), 0);

        assert_eq!(demand.request(10).unwrap(), 10);
        assert_eq!(demand.remaining(), 10);
        assert_eq!(demand.request(3).unwrap(), 13);
        assert_eq!(demand.remaining(), 13);
        assert_eq!(demand.unclaimed(), 13);
    }

    #[test]
    fn zero_request_is_rejected() {
        let demand = DemandController::new(5, 10).unwrap();
        demand.request(2).unwrap();

        assert_eq!(
            demand.request(0),
            Err(Error::InvalidDemand { requested: 0 })
        );
        assert_eq!(demand.remaining(), 2);
    }

    #[test]
    fn overflowing_request_is_rejected() {
        let demand = DemandController::new(5, 10).unwrap();
        demand.request(u64::MAX).unwrap();

        assert_eq!(
            demand.request(1),
            Err(Error::InvalidDemand { requested: 1 })
        );
        assert_eq!(demand.remaining(), u64::MAX);
    }

    #[test]
    fn zero_refill_batch_is_rejected() {
        assert!(matches!(
            DemandController::new(5, 0),
            Err(Error::InvalidDemand { requested: 0 })
        ));
    }

    #[test]
    fn consume_beyond_remaining_underflows_and_leaves_demand() {
        let demand = DemandController::new(5, 10).unwrap();
        demand.request(3).unwrap();

        assert_eq!(
            demand.consume(4),
            Err(Error::DemandUnderflow {
                requested: 4,
                remaining: 3
            })
        );
        assert_eq!(demand.remaining(), 3);

        assert_eq!(demand.consume(3).unwrap(), 0);
        assert_eq!(
            demand.consume(1),
            Err(Error::DemandUnderflow {
                requested: 1,
                remaining: 0
            })
        );
    }

    #[test]
    fn claims_are_bounded_by_requests() {
        let demand = DemandController::new(0, 1).unwrap();
        assert!(!demand.try_claim());

        demand.request(2).unwrap();
        assert!(demand.try_claim());
        assert!(demand.try_claim());
        assert!(!demand.try_claim());

        // Claiming never touches the outstanding demand.
        assert_eq!(demand.remaining(), 2);
    }

    #[test]
    fn consuming_unclaimed_demand_shrinks_permits() {
        let demand = DemandController::new(0, 1).unwrap();
        demand.request(4).unwrap();
        assert!(demand.try_claim());

        demand.consume(3).unwrap();
        assert_eq!(demand.remaining(), 1);
        assert_eq!(demand.unclaimed(), 1);
    }

    #[test]
    fn replenish_only_at_or_below_low_water_mark() {
        let demand = DemandController::new(5, 10).unwrap();
        demand.request(10).unwrap();

        for expected in (6..10).rev() {
            demand.consume(1).unwrap();
            assert_eq!(demand.remaining(), expected);
            assert_eq!(demand.replenish(), None);
        }

        demand.consume(1).unwrap();
        assert!(demand.needs_refill());
        assert_eq!(demand.replenish(), Some(10));
        assert_eq!(demand.remaining(), 15);
        assert!(!demand.needs_refill());
    }

    #[test]
    fn concurrent_consumers_keep_demand_within_bounds() {
        const LOW: u64 = 5;
        const BATCH: u64 = 10;
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let demand = Arc::new(DemandController::new(LOW, BATCH).unwrap());
        demand.request(BATCH).unwrap();

        scope(|s| {
            for _ in 0..THREADS {
                let demand = Arc::clone(&demand);
                s.spawn(move || {
                    for _ in 0..PER_THREAD {
                        // Only consume what a publisher could have delivered.
                        while !demand.try_claim() {
                            std::thread::yield_now();
                        }
                        demand.consume(1).unwrap();
                        demand.replenish();
                        assert!(demand.remaining() <= LOW + BATCH);
                    }
                });
            }
        });

        assert!(demand.remaining() > LOW);
        assert!(demand.remaining() <= LOW + BATCH);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn claim_waits_for_request() {
        let demand = Arc::new(DemandController::new(0, 1).unwrap());

        let waiter = {
            let demand = Arc::clone(&demand);
            tokio::spawn(async move { demand.claim().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        demand.request(1).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("claim should complete after a request")
            .unwrap();
        assert_eq!(demand.unclaimed(), 0);
    }

    #[tokio::test]
    async fn grant_before_wait_is_not_lost() {
        let demand = DemandController::new(0, 1).unwrap();
        demand.request(1).unwrap();

        tokio::time::timeout(Duration::from_secs(1), demand.claim())
            .await
            .expect("stored grant should satisfy the claim");
    }
}
