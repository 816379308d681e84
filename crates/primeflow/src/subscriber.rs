//! The consuming side of the pipeline.
//!
//! A [`HybridSubscriber`] pulls demand in batches from its
//! [`DemandController`] and lets the publisher push freely within each batch.
//! Delivered items are checked by a bounded pool of workers running on the
//! subscriber's own [`Scheduler`]; [`HybridSubscriber::wait`] blocks the
//! caller until the run settles.

mod context;
mod dispatch;
mod lifecycle;
mod pool;
mod worker;

pub use context::Sink;
pub use lifecycle::PipelineState;

use crate::{
    DemandController, EmitStats, Outcome, PipelineConfig, PrimeChecker, Result, Scheduler,
    Sequence,
};
use context::RunContext;
use core::{fmt, time::Duration};
use lifecycle::Lifecycle;
use parking_lot::Mutex;
use pool::WorkerPool;
use std::{collections::HashSet, sync::Arc};

const MAX_PREALLOCATED: usize = 1 << 16;

/// Everything a settled run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunReport {
    /// `Completed` or `Cancelled`; failed runs are reported as errors.
    pub state: PipelineState,
    /// Outcomes in completion order.
    pub outcomes: Vec<Outcome>,
    pub fresh_computations: u64,
    pub cache_hits: u64,
    /// Publisher counters, present once the publisher completed.
    pub emitted: Option<EmitStats>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of outcomes whose value had already been checked in this run.
    pub fn duplicates(&self) -> usize {
        let distinct: HashSet<u64> = self.outcomes.iter().map(|o| o.item.value).collect();
        self.outcomes.len() - distinct.len()
    }

    pub fn primes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_prime())
    }

    /// Outcomes ordered by emission sequence.
    pub fn ordered(&self) -> Vec<Outcome> {
        let mut outcomes = self.outcomes.clone();
        outcomes.sort_unstable_by_key(|o| o.item.sequence);
        outcomes
    }
}

struct Run {
    context: Arc<RunContext>,
    pool: Arc<WorkerPool>,
}

impl Drop for Run {
    fn drop(&mut self) {
        self.context.cancel.cancel();
    }
}

/// Consumes a [`Sequence`] with batched demand and a bounded worker pool.
///
/// A subscriber drives exactly one run: `Idle -> Running -> {Completed,
/// Failed, Cancelled}`.
///
/// # Example
/// ```
/// use primeflow::{HybridSubscriber, PipelineConfig, PipelineState, PrimeOracle, Publisher};
///
/// let config = PipelineConfig {
///     count: 20,
///     parallelism: 2,
///     ..PipelineConfig::default()
/// };
/// let publisher = Publisher::new(config.overflow_policy).unwrap();
/// let subscriber = HybridSubscriber::new(PrimeOracle, &config).unwrap();
///
/// let sequence = publisher
///     .start(config.count, config.max_value, config.backpressure_enabled)
///     .unwrap();
/// subscriber.subscribe(sequence).unwrap();
/// let report = subscriber.wait().unwrap();
///
/// assert_eq!(report.state, PipelineState::Completed);
/// assert_eq!(report.len(), 20);
/// subscriber.dispose();
/// publisher.dispose();
/// ```
pub struct HybridSubscriber {
    checker: Arc<dyn PrimeChecker>,
    demand: Arc<DemandController>,
    lifecycle: Arc<Lifecycle>,
    sink: Option<Sink>,
    scheduler: Scheduler,
    parallelism: usize,
    worker_buffer: usize,
    shutdown_timeout: Duration,
    run: Mutex<Option<Run>>,
}

impl HybridSubscriber {
    /// Creates an idle subscriber that checks items with `checker`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `config` does not validate.
    /// - [`Error::Scheduler`] if the subscriber runtime cannot be built.
    ///
    /// [`Error::InvalidConfig`]: crate::Error::InvalidConfig
    /// [`Error::Scheduler`]: crate::Error::Scheduler
    pub fn new<C>(checker: C, config: &PipelineConfig) -> Result<Self>
    where
        C: PrimeChecker + 'static,
    {
        config.validate()?;

        Ok(Self {
            checker: Arc::new(checker),
            demand: Arc::new(DemandController::new(
                config.low_water_mark,
                config.refill_batch,
            )?),
            lifecycle: Arc::new(Lifecycle::default()),
            sink: None,
            scheduler: Scheduler::new("subscriber", config.parallelism)?,
            parallelism: config.parallelism,
            worker_buffer: config.worker_buffer,
            shutdown_timeout: config.shutdown_timeout,
            run: Mutex::new(None),
        })
    }

    /// Invokes `sink` on a worker thread for every outcome.
    #[must_use]
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Requests the first batch of demand, connects `sequence` and starts
    /// dispatching its items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the subscriber is idle.
    ///
    /// [`Error::InvalidState`]: crate::Error::InvalidState
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(count = sequence.count())))]
    pub fn subscribe(&self, sequence: Sequence) -> Result<()> {
        self.lifecycle.start()?;

        let context = Arc::new(RunContext::new(
            Arc::clone(&self.checker),
            Arc::clone(&self.demand),
            Arc::clone(&self.lifecycle),
            self.sink.clone(),
            usize::try_from(sequence.count()).map_or(0, |n| n.min(MAX_PREALLOCATED)),
        ));

        if let Err(e) = self.demand.request(self.demand.refill_batch()) {
            context.fail(e.clone());
            return Err(e);
        }

        let pool = Arc::new(WorkerPool::spawn(
            &self.scheduler,
            &context,
            self.parallelism,
            self.worker_buffer,
        ));
        let signals = sequence.connect(Arc::clone(&self.demand));
        self.scheduler.spawn(dispatch::dispatch(
            signals,
            Arc::clone(&pool),
            Arc::clone(&context),
        ));

        *self.run.lock() = Some(Run { context, pool });
        Ok(())
    }

    /// Blocks until the run settles.
    ///
    /// A cancelled run is not an error: its report carries
    /// [`PipelineState::Cancelled`].
    ///
    /// # Errors
    ///
    /// - The first error of a failed run.
    /// - [`Error::InvalidState`] if the subscriber was never subscribed.
    ///
    /// [`Error::InvalidState`]: crate::Error::InvalidState
    pub fn wait(&self) -> Result<RunReport> {
        let (state, elapsed) = self.lifecycle.wait()?;
        let run = self.run.lock();
        let report = match run.as_ref() {
            Some(run) => RunReport {
                state,
                outcomes: run.context.outcomes(),
                fresh_computations: run.context.fresh_computations(),
                cache_hits: run.context.cache_hits(),
                emitted: run.context.emitted(),
                elapsed,
            },
            None => RunReport {
                state,
                outcomes: Vec::new(),
                fresh_computations: 0,
                cache_hits: 0,
                emitted: None,
                elapsed,
            },
        };
        Ok(report)
    }

    /// Cancels a running pipeline. Returns `false` if it was not running.
    pub fn cancel(&self) -> bool {
        let cancelled = self.lifecycle.settle(PipelineState::Cancelled, None);
        if let Some(run) = self.run.lock().as_ref() {
            run.context.cancel.cancel();
        }
        cancelled
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    pub fn demand(&self) -> &Arc<DemandController> {
        &self.demand
    }

    pub fn fresh_computations(&self) -> u64 {
        self.run
            .lock()
            .as_ref()
            .map_or(0, |run| run.context.fresh_computations())
    }

    pub fn cache_hits(&self) -> u64 {
        self.run
            .lock()
            .as_ref()
            .map_or(0, |run| run.context.cache_hits())
    }

    /// Cancels any unfinished run, shuts the worker pool down and stops the
    /// subscriber scheduler.
    ///
    /// Must be called from outside any runtime.
    pub fn dispose(self) {
        self.cancel();

        let Self {
            scheduler,
            run,
            shutdown_timeout,
            ..
        } = self;
        if let Some(run) = run.into_inner() {
            let pool = Arc::clone(&run.pool);
            scheduler.block_on(async move { pool.shutdown(shutdown_timeout).await });
        }
        scheduler.dispose(shutdown_timeout);
    }
}

impl fmt::Debug for HybridSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridSubscriber")
            .field("state", &self.state())
            .field("demand", &self.demand)
            .field("scheduler", &self.scheduler)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}
