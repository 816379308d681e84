use crate::{Error, OverflowPolicy, Result};
use core::time::Duration;

/// Parameters of a single pipeline run.
///
/// `count`, `max_value` and `overflow_policy` configure the publisher;
/// `parallelism`, `low_water_mark` and `refill_batch` configure the
/// subscriber and its demand controller.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Number of items the publisher emits.
    pub count: u64,
    /// Inclusive upper bound of emitted values; the lower bound is `2`.
    pub max_value: u64,
    /// Worker count (and subscriber scheduler threads).
    pub parallelism: usize,
    pub overflow_policy: OverflowPolicy,
    /// Refill when outstanding demand drops to this value or below.
    pub low_water_mark: u64,
    /// Demand requested per refill, and initially.
    pub refill_batch: u64,
    /// When `false`, `overflow_policy` is bypassed and the publisher emits
    /// without waiting for demand.
    pub backpressure_enabled: bool,
    /// Capacity of each worker's request channel.
    pub worker_buffer: usize,
    /// Upper bound for worker acknowledgements and runtime shutdown.
    pub shutdown_timeout: Duration,
}

impl PipelineConfig {
    pub const DEFAULT_COUNT: u64 = 50;
    pub const DEFAULT_MAX_VALUE: u64 = 100_000;
    pub const DEFAULT_LOW_WATER_MARK: u64 = 5;
    pub const DEFAULT_REFILL_BATCH: u64 = 10;
    pub const DEFAULT_WORKER_BUFFER: usize = 1;
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

    /// The overflow policy the publisher actually applies.
    pub const fn effective_policy(&self) -> OverflowPolicy {
        if self.backpressure_enabled {
            self.overflow_policy
        } else {
            OverflowPolicy::Ignore
        }
    }

    /// Checks that the configuration can drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.max_value < 2 {
            format!("max_value must be at least 2, got {}", self.max_value)
        } else if self.parallelism == 0 {
            "parallelism must be greater than 0".to_string()
        } else if self.refill_batch == 0 {
            "refill_batch must be greater than 0".to_string()
        } else if self.worker_buffer == 0 {
            "worker_buffer must be greater than 0".to_string()
        } else {
            return Ok(());
        };

        Err(Error::InvalidConfig { reason })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            count: Self::DEFAULT_COUNT,
            max_value: Self::DEFAULT_MAX_VALUE,
            parallelism: num_cpus::get(),
            overflow_policy: OverflowPolicy::default(),
            low_water_mark: Self::DEFAULT_LOW_WATER_MARK,
            refill_batch: Self::DEFAULT_REFILL_BATCH,
            backpressure_enabled: true,
            worker_buffer: Self::DEFAULT_WORKER_BUFFER,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.count, 50);
        assert_eq!(config.max_value, 100_000);
        assert_eq!(config.overflow_policy, OverflowPolicy::PushPull);
        assert_eq!(config.parallelism, num_cpus::get());
    }

    #[test]
    fn rejects_out_of_bounds_fields() {
        let cases = [
            PipelineConfig {
                max_value: 1,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                parallelism: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                refill_batch: 0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                worker_buffer: 0,
                ..PipelineConfig::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig { .. })),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn disabled_backpressure_ignores_policy() {
        let config = PipelineConfig {
            overflow_policy: OverflowPolicy::Error,
            backpressure_enabled: false,
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_policy(), OverflowPolicy::Ignore);
    }
}
