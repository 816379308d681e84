use crate::{DemandController, EmitStats, Error, Item};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// One item handed to the subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub item: Item,
    /// Whether the publisher claimed a demand permit for this item. Only
    /// claimed deliveries are consumed from the demand once processed.
    pub claimed: bool,
}

/// Everything a publisher can tell its subscriber.
///
/// A run ends with exactly one of `Error`, `Complete` or `Cancelled`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Next(Delivery),
    /// The run aborted; no further items follow.
    Error(Error),
    /// Every item was produced and accounted for.
    Complete(EmitStats),
    /// The publisher was stopped.
    Cancelled,
}

impl Signal {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

/// A cold sequence returned by [`Publisher::start`].
///
/// Nothing is emitted until [`Sequence::connect`] hands the publisher the
/// subscriber's demand.
///
/// [`Publisher::start`]: crate::Publisher::start
#[derive(Debug)]
pub struct Sequence {
    count: u64,
    connect: oneshot::Sender<Arc<DemandController>>,
    signals: mpsc::UnboundedReceiver<Signal>,
}

impl Sequence {
    pub(crate) const fn new(
        count: u64,
        connect: oneshot::Sender<Arc<DemandController>>,
        signals: mpsc::UnboundedReceiver<Signal>,
    ) -> Self {
        Self {
            count,
            connect,
            signals,
        }
    }

    /// Number of items the publisher will produce.
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Starts emission against `demand` and returns the signal stream.
    ///
    /// Demand the subscriber wants in place before the first item must be
    /// requested before calling this.
    pub fn connect(self, demand: Arc<DemandController>) -> mpsc::UnboundedReceiver<Signal> {
        // A publisher stopped before this point has already queued
        // `Signal::Cancelled`, so a refused connection needs no handling.
        if self.connect.send(demand).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Publisher stopped before the sequence was connected");
        }
        self.signals
    }
}
