use super::{Lifecycle, PipelineState};
use crate::{DemandController, EmitStats, Error, Outcome, PrimeChecker};
use core::fmt;
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-item callback invoked by workers for every recorded outcome.
pub type Sink = Arc<dyn Fn(&Outcome) + Send + Sync>;

/// State shared by the dispatcher and every worker of one run.
pub(super) struct RunContext {
    pub(super) checker: Arc<dyn PrimeChecker>,
    pub(super) demand: Arc<DemandController>,
    pub(super) cancel: CancellationToken,
    lifecycle: Arc<Lifecycle>,
    sink: Option<Sink>,
    outcomes: Mutex<Vec<Outcome>>,
    emitted: Mutex<Option<EmitStats>>,
    fresh: AtomicU64,
    hits: AtomicU64,
}

impl RunContext {
    pub(super) fn new(
        checker: Arc<dyn PrimeChecker>,
        demand: Arc<DemandController>,
        lifecycle: Arc<Lifecycle>,
        sink: Option<Sink>,
        capacity: usize,
    ) -> Self {
        Self {
            checker,
            demand,
            cancel: CancellationToken::new(),
            lifecycle,
            sink,
            outcomes: Mutex::new(Vec::with_capacity(capacity)),
            emitted: Mutex::new(None),
            fresh: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    pub(super) fn record(&self, outcome: Outcome) {
        if outcome.from_cache {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fresh.fetch_add(1, Ordering::Relaxed);
        }
        self.outcomes.lock().push(outcome);
    }

    pub(super) fn sink(&self) -> Option<&Sink> {
        self.sink.as_ref()
    }

    pub(super) fn set_emitted(&self, stats: EmitStats) {
        *self.emitted.lock() = Some(stats);
    }

    /// Moves the run to `terminal` and stops all remaining work.
    pub(super) fn settle(&self, terminal: PipelineState, error: Option<Error>) {
        self.lifecycle.settle(terminal, error);
        self.cancel.cancel();
    }

    pub(super) fn fail(&self, error: Error) {
        self.settle(PipelineState::Failed, Some(error));
    }

    pub(super) fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub(super) fn emitted(&self) -> Option<EmitStats> {
        *self.emitted.lock()
    }

    pub(super) fn fresh_computations(&self) -> u64 {
        self.fresh.load(Ordering::Relaxed)
    }

    pub(super) fn cache_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("demand", &self.demand)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("outcomes", &self.outcomes.lock().len())
            .field("fresh", &self.fresh_computations())
            .field("hits", &self.cache_hits())
            .finish_non_exhaustive()
    }
}
