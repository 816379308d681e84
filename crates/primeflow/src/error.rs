//! Error types for the prime-checking pipeline.
//!
//! ## Error Cases
//! - Contract violations, raised immediately to the caller and never retried:
//!   `InvalidDemand`, `DemandUnderflow`, `ClosedCache`, `InvalidConfig`,
//!   `InvalidState`.
//! - Run-level failures, which move a subscriber to
//!   [`PipelineState::Failed`] and are returned from
//!   [`HybridSubscriber::wait`]: `Overflow`, `Computation`, `ChannelError`.
//! - `Scheduler`: a runtime backing a scheduler could not be built.
//!
//! [`PipelineState::Failed`]: crate::PipelineState::Failed
//! [`HybridSubscriber::wait`]: crate::HybridSubscriber::wait

use crate::PipelineState;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A demand request was zero or would overflow the demand counter.
    #[error("Invalid demand request: {requested}")]
    InvalidDemand { requested: u64 },

    /// More items were consumed than the outstanding demand allows.
    #[error("Demand underflow: consumed {requested} with only {remaining} remaining")]
    DemandUnderflow { requested: u64, remaining: u64 },

    /// The memoizer was used after [`Memoizer::shutdown`].
    ///
    /// [`Memoizer::shutdown`]: crate::Memoizer::shutdown
    #[error("Memoizer has been shut down")]
    ClosedCache,

    /// The publisher had an item ready but no demand under
    /// [`OverflowPolicy::Error`].
    ///
    /// [`OverflowPolicy::Error`]: crate::OverflowPolicy::Error
    #[error("Overflow: item #{sequence} emitted without outstanding demand")]
    Overflow { sequence: u64 },

    /// A prime check failed or panicked.
    #[error("Computation failed: {reason}")]
    Computation { reason: String },

    /// The pipeline configuration is out of bounds.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// An operation was attempted from a lifecycle state that does not allow
    /// it.
    #[error("Invalid state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: PipelineState,
        actual: PipelineState,
    },

    /// A scheduler runtime could not be created.
    #[error("Scheduler error: {context}")]
    Scheduler { context: String },

    /// Internal channel send/receive failure (e.g. a worker went away).
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

impl Error {
    /// Returns `true` for errors that indicate a caller bug rather than a
    /// failed run.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDemand { .. }
                | Self::DemandUnderflow { .. }
                | Self::ClosedCache
                | Self::InvalidConfig { .. }
                | Self::InvalidState { .. }
        )
    }
}
