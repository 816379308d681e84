use crate::{Error, Result};
use core::{fmt, time::Duration};
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Lifecycle of a [`HybridSubscriber`](crate::HybridSubscriber).
///
/// States only move forward: `Idle -> Running -> {Completed, Failed,
/// Cancelled}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Status {
    state: PipelineState,
    error: Option<Error>,
    started: Option<Instant>,
    settled: Option<Instant>,
}

/// The state machine plus the single blocking primitive behind
/// [`HybridSubscriber::wait`](crate::HybridSubscriber::wait).
#[derive(Debug, Default)]
pub(super) struct Lifecycle {
    status: Mutex<Status>,
    settled: Condvar,
}

impl Lifecycle {
    pub(super) fn state(&self) -> PipelineState {
        self.status.lock().state
    }

    /// `Idle -> Running`.
    pub(super) fn start(&self) -> Result<()> {
        let mut status = self.status.lock();
        if status.state != PipelineState::Idle {
            return Err(Error::InvalidState {
                expected: PipelineState::Idle,
                actual: status.state,
            });
        }
        status.state = PipelineState::Running;
        status.started = Some(Instant::now());
        Ok(())
    }

    /// Moves a running pipeline to `terminal`, keeping `error` as the run's
    /// failure. Returns `false` if the pipeline was not running, in which
    /// case nothing changes and `error` is discarded.
    pub(super) fn settle(&self, terminal: PipelineState, error: Option<Error>) -> bool {
        debug_assert!(terminal.is_terminal());

        let mut status = self.status.lock();
        if status.state != PipelineState::Running {
            return false;
        }

        #[cfg(feature = "tracing")]
        {
            match &error {
                Some(e) => tracing::warn!("Pipeline {terminal}: {e}"),
                None => tracing::debug!("Pipeline {terminal}"),
            }
        }

        status.state = terminal;
        status.error = error;
        status.settled = Some(Instant::now());
        drop(status);

        self.settled.notify_all();
        true
    }

    /// Blocks until a terminal state is reached.
    ///
    /// Returns the terminal state and the run's elapsed time, or the first
    /// error of a failed run.
    pub(super) fn wait(&self) -> Result<(PipelineState, Duration)> {
        let mut status = self.status.lock();
        if status.state == PipelineState::Idle {
            return Err(Error::InvalidState {
                expected: PipelineState::Running,
                actual: PipelineState::Idle,
            });
        }

        while !status.state.is_terminal() {
            self.settled.wait(&mut status);
        }

        if let Some(error) = &status.error {
            return Err(error.clone());
        }
        let elapsed = match (status.started, status.settled) {
            (Some(started), Some(settled)) => settled.duration_since(started),
            _ => Duration::ZERO,
        };
        Ok((status.state, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn moves_forward_only() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), PipelineState::Idle);
        assert!(!lifecycle.settle(PipelineState::Completed, None));

        lifecycle.start().unwrap();
        assert_eq!(
            lifecycle.start(),
            Err(Error::InvalidState {
                expected: PipelineState::Idle,
                actual: PipelineState::Running,
            })
        );

        assert!(lifecycle.settle(PipelineState::Cancelled, None));
        assert!(!lifecycle.settle(PipelineState::Completed, None));
        assert_eq!(lifecycle.state(), PipelineState::Cancelled);
    }

    #[test]
    fn first_error_wins() {
        let lifecycle = Lifecycle::default();
        lifecycle.start().unwrap();

        assert!(lifecycle.settle(
            PipelineState::Failed,
            Some(Error::Overflow { sequence: 3 })
        ));
        assert!(!lifecycle.settle(PipelineState::Failed, Some(Error::ClosedCache)));
        assert_eq!(lifecycle.wait(), Err(Error::Overflow { sequence: 3 }));
    }

    #[test]
    fn wait_before_start_is_rejected() {
        let lifecycle = Lifecycle::default();
        assert!(matches!(
            lifecycle.wait(),
            Err(Error::InvalidState {
                actual: PipelineState::Idle,
                ..
            })
        ));
    }

    #[test]
    fn wait_blocks_until_settled() {
        let lifecycle = Arc::new(Lifecycle::default());
        lifecycle.start().unwrap();

        let waiter = {
            let lifecycle = Arc::clone(&lifecycle);
            thread::spawn(move || lifecycle.wait())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        lifecycle.settle(PipelineState::Completed, None);
        let (state, _elapsed) = waiter.join().unwrap().unwrap();
        assert_eq!(state, PipelineState::Completed);
    }

    #[test]
    fn display_is_upper_case() {
        assert_eq!(PipelineState::Completed.to_string(), "COMPLETED");
        assert!(!PipelineState::Running.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
    }
}
