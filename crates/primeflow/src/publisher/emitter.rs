use super::{Delivery, Signal};
use crate::{DemandController, EmitStats, Error, Item, OverflowPolicy, RandSource};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Emission state shared by the emitter task and [`Publisher::stop`].
///
/// Every signal is sent while holding this state's lock, and a finished state
/// sends nothing more, so once `stop` returns the subscriber sees no further
/// items.
///
/// [`Publisher::stop`]: crate::Publisher::stop
pub(super) struct EmitState {
    signals: mpsc::UnboundedSender<Signal>,
    buffer: VecDeque<Item>,
    latest: Option<Item>,
    stats: EmitStats,
    finished: bool,
}

impl EmitState {
    pub(super) const fn new(signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self {
            signals,
            buffer: VecDeque::new(),
            latest: None,
            stats: EmitStats {
                delivered: 0,
                unclaimed: 0,
                dropped: 0,
                overwritten: 0,
            },
            finished: false,
        }
    }

    /// Returns `false` once the subscriber has gone away.
    fn send(&mut self, signal: Signal) -> bool {
        if self.signals.send(signal).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Subscriber disconnected, ending emission");
            self.finished = true;
            return false;
        }
        true
    }

    fn deliver(&mut self, item: Item, claimed: bool) -> bool {
        if !self.send(Signal::Next(Delivery { item, claimed })) {
            return false;
        }
        self.stats.delivered += 1;
        if !claimed {
            self.stats.unclaimed += 1;
        }
        true
    }

    /// Hands `item` to the subscriber or parks/drops/rejects it according to
    /// `policy`. Under [`OverflowPolicy::PushPull`] the caller has already
    /// claimed a permit.
    fn offer(&mut self, policy: OverflowPolicy, demand: &DemandController, item: Item) -> bool {
        match policy {
            OverflowPolicy::PushPull => self.deliver(item, true),
            OverflowPolicy::Ignore => {
                let claimed = demand.try_claim();
                self.deliver(item, claimed)
            }
            OverflowPolicy::Buffer => {
                self.buffer.push_back(item);
                self.drain(demand)
            }
            OverflowPolicy::Error => {
                if demand.try_claim() {
                    return self.deliver(item, true);
                }
                self.send(Signal::Error(Error::Overflow {
                    sequence: item.sequence,
                }));
                self.finished = true;
                false
            }
            OverflowPolicy::Latest => {
                if !self.drain(demand) {
                    return false;
                }
                if demand.try_claim() {
                    return self.deliver(item, true);
                }
                if self.latest.replace(item).is_some() {
                    self.stats.overwritten += 1;
                }
                true
            }
            OverflowPolicy::Drop => {
                if demand.try_claim() {
                    return self.deliver(item, true);
                }
                self.stats.dropped += 1;
                true
            }
        }
    }

    /// Delivers parked items for as long as permits are available.
    fn drain(&mut self, demand: &DemandController) -> bool {
        while !self.buffer.is_empty() || self.latest.is_some() {
            if !demand.try_claim() {
                break;
            }
            if !self.deliver_parked() {
                return false;
            }
        }
        true
    }

    /// Delivers the oldest parked item against a permit the caller holds.
    fn deliver_parked(&mut self) -> bool {
        match self.buffer.pop_front().or_else(|| self.latest.take()) {
            Some(item) => self.deliver(item, true),
            None => true,
        }
    }

    fn has_parked(&self) -> bool {
        !self.buffer.is_empty() || self.latest.is_some()
    }

    fn complete(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Emission complete: {:?}", self.stats);
        let stats = self.stats;
        self.send(Signal::Complete(stats));
        self.finished = true;
    }

    /// Ends the run on behalf of [`Publisher::stop`]: buffered items are
    /// flushed without permits, a parked latest item is discarded.
    ///
    /// Returns `false` if the run had already finished.
    ///
    /// [`Publisher::stop`]: crate::Publisher::stop
    pub(super) fn cancel(&mut self) -> bool {
        if self.finished {
            return false;
        }

        while let Some(item) = self.buffer.pop_front() {
            if !self.deliver(item, false) {
                return true;
            }
        }
        self.latest = None;
        self.send(Signal::Cancelled);
        self.finished = true;
        true
    }
}

/// The task body of one publisher run.
pub(super) struct Emitter<R> {
    pub(super) state: Arc<Mutex<EmitState>>,
    pub(super) cancel: CancellationToken,
    pub(super) rand: Arc<R>,
    pub(super) policy: OverflowPolicy,
    pub(super) count: u64,
    pub(super) max_value: u64,
}

impl<R: RandSource> Emitter<R> {
    /// Runs `f` against the shared state unless the run has finished.
    fn locked<T>(&self, f: impl FnOnce(&mut EmitState) -> T) -> Option<T> {
        let mut state = self.state.lock();
        if state.finished {
            return None;
        }
        Some(f(&mut state))
    }

    async fn claim(&self, demand: &DemandController) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = demand.claim() => true,
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "debug", skip_all, fields(count = self.count, policy = %self.policy))
    )]
    pub(super) async fn run(self, connect: oneshot::Receiver<Arc<DemandController>>) {
        let demand = tokio::select! {
            () = self.cancel.cancelled() => return,
            connected = connect => match connected {
                Ok(demand) => demand,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Sequence dropped without a subscriber");
                    return;
                }
            },
        };

        for sequence in 0..self.count {
            let item = Item {
                sequence,
                value: self.rand.rand_in(2..=self.max_value),
            };

            if self.policy == OverflowPolicy::PushPull && !self.claim(&demand).await {
                return;
            }
            if self.locked(|state| state.offer(self.policy, &demand, item)) != Some(true) {
                return;
            }
        }

        // BUFFER and LATEST may still hold items waiting for demand.
        loop {
            match self.locked(|state| state.drain(&demand).then(|| state.has_parked())) {
                Some(Some(true)) => {}
                Some(Some(false)) => break,
                Some(None) | None => return,
            }
            if !self.claim(&demand).await {
                return;
            }
            if self.locked(EmitState::deliver_parked) != Some(true) {
                return;
            }
        }

        self.locked(EmitState::complete);
    }
}
