//! The producing side of the pipeline.
//!
//! A [`Publisher`] owns a single-threaded [`Scheduler`] and, per run, spawns
//! one emitter task that produces `count` random integers in
//! `[2, max_value]`. How items meet the subscriber's demand is decided by the
//! publisher's [`OverflowPolicy`].

mod emitter;
mod sequence;

pub use sequence::*;

use crate::{Error, OverflowPolicy, PipelineConfig, RandSource, Result, Scheduler, ThreadRandom};
use core::time::Duration;
use emitter::{EmitState, Emitter};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

struct ActiveRun {
    cancel: CancellationToken,
    state: Arc<Mutex<EmitState>>,
}

impl ActiveRun {
    fn stop(&self) -> bool {
        self.cancel.cancel();
        self.state.lock().cancel()
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Emits bounded random sequences under an [`OverflowPolicy`].
///
/// One run is active at a time; starting a new run stops the previous one.
pub struct Publisher<R: RandSource + 'static = ThreadRandom> {
    scheduler: Scheduler,
    rand: Arc<R>,
    policy: OverflowPolicy,
    shutdown_timeout: Duration,
    active: Mutex<Option<ActiveRun>>,
}

impl Publisher<ThreadRandom> {
    /// Creates a publisher drawing values from the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scheduler`] if the publisher runtime cannot be built.
    pub fn new(policy: OverflowPolicy) -> Result<Self> {
        Self::with_rand(policy, ThreadRandom)
    }
}

impl<R: RandSource + 'static> Publisher<R> {
    /// Creates a publisher drawing values from `rand`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scheduler`] if the publisher runtime cannot be built.
    pub fn with_rand(policy: OverflowPolicy, rand: R) -> Result<Self> {
        Ok(Self {
            scheduler: Scheduler::new("publisher", 1)?,
            rand: Arc::new(rand),
            policy,
            shutdown_timeout: PipelineConfig::DEFAULT_SHUTDOWN_TIMEOUT,
            active: Mutex::new(None),
        })
    }

    /// Creates a publisher for `config`'s policy and shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scheduler`] if the publisher runtime cannot be built.
    pub fn from_config(config: &PipelineConfig, rand: R) -> Result<Self> {
        let mut publisher = Self::with_rand(config.overflow_policy, rand)?;
        publisher.shutdown_timeout = config.shutdown_timeout;
        Ok(publisher)
    }

    pub const fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Prepares a run of `count` items in `[2, max_value]`.
    ///
    /// Emission starts once the returned [`Sequence`] is connected. With
    /// `overflow_enabled == false` the configured policy is bypassed and items
    /// are emitted as under [`OverflowPolicy::Ignore`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_value < 2`.
    pub fn start(&self, count: u64, max_value: u64, overflow_enabled: bool) -> Result<Sequence> {
        if max_value < 2 {
            return Err(Error::InvalidConfig {
                reason: format!("max_value must be at least 2, got {max_value}"),
            });
        }

        let policy = if overflow_enabled {
            self.policy
        } else {
            OverflowPolicy::Ignore
        };

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (connect_tx, connect_rx) = oneshot::channel();
        let run = ActiveRun {
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(EmitState::new(signal_tx))),
        };

        let emitter = Emitter {
            state: Arc::clone(&run.state),
            cancel: run.cancel.clone(),
            rand: Arc::clone(&self.rand),
            policy,
            count,
            max_value,
        };

        // Replacing the slot drops, and therefore stops, any previous run.
        let previous = self.active.lock().replace(run);
        drop(previous);

        self.scheduler.spawn(emitter.run(connect_rx));

        #[cfg(feature = "tracing")]
        tracing::debug!("Publisher prepared {count} items in [2, {max_value}] under {policy}");

        Ok(Sequence::new(count, connect_tx, signal_rx))
    }

    /// Stops the active run.
    ///
    /// Buffered items are flushed to the subscriber as unclaimed deliveries
    /// followed by [`Signal::Cancelled`]; nothing is emitted after this
    /// returns. Returns `false` if there was no unfinished run.
    pub fn stop(&self) -> bool {
        let run = self.active.lock().take();
        run.is_some_and(|run| run.stop())
    }

    /// Stops the active run and shuts the publisher scheduler down.
    pub fn dispose(self) {
        let Self {
            scheduler,
            active,
            shutdown_timeout,
            ..
        } = self;
        drop(active);
        scheduler.dispose(shutdown_timeout);
    }
}
