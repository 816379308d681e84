use anyhow::Context;
use clap::Parser;
use core::time::Duration;
use primeflow::{OverflowPolicy, PipelineConfig, RandSource, ThreadRandom};

/// Runtime configuration for the `primeflow` binary.
///
/// Every option can also be set through the environment (or a `.env` file),
/// which is handy when sweeping policies from a script.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "primeflow",
    version,
    about = "Times a backpressured prime-checking pipeline with and without memoization"
)]
pub struct CliArgs {
    /// Number of random integers the publisher emits per run.
    ///
    /// Environment variable: `COUNT`
    #[arg(short, long, env = "COUNT", default_value_t = PipelineConfig::DEFAULT_COUNT)]
    pub count: u64,

    /// Inclusive upper bound of the emitted integers (the lower bound is 2).
    ///
    /// Environment variable: `MAX_VALUE`
    #[arg(long, env = "MAX_VALUE", default_value_t = PipelineConfig::DEFAULT_MAX_VALUE)]
    pub max_value: u64,

    /// Number of workers checking items concurrently. Defaults to the number
    /// of logical CPUs.
    ///
    /// Environment variable: `PARALLELISM`
    #[arg(short, long, env = "PARALLELISM")]
    pub parallelism: Option<usize>,

    /// What the publisher does with an item when the subscriber has no
    /// outstanding demand: ignore, buffer, error, latest, drop or push-pull.
    ///
    /// Environment variable: `OVERFLOW_POLICY`
    #[arg(short, long, env = "OVERFLOW_POLICY", default_value_t = OverflowPolicy::PushPull)]
    pub overflow_policy: OverflowPolicy,

    /// Request another batch once outstanding demand drops to this value.
    ///
    /// Environment variable: `LOW_WATER_MARK`
    #[arg(long, env = "LOW_WATER_MARK", default_value_t = PipelineConfig::DEFAULT_LOW_WATER_MARK)]
    pub low_water_mark: u64,

    /// Demand requested initially and per refill.
    ///
    /// Environment variable: `REFILL_BATCH`
    #[arg(long, env = "REFILL_BATCH", default_value_t = PipelineConfig::DEFAULT_REFILL_BATCH)]
    pub refill_batch: u64,

    /// Emit without waiting for demand, bypassing the overflow policy.
    ///
    /// Environment variable: `NO_BACKPRESSURE`
    #[arg(long, env = "NO_BACKPRESSURE", default_value_t = false)]
    pub no_backpressure: bool,

    /// Capacity of each worker's request channel.
    ///
    /// Environment variable: `WORKER_BUFFER`
    #[arg(long, env = "WORKER_BUFFER", default_value_t = PipelineConfig::DEFAULT_WORKER_BUFFER)]
    pub worker_buffer: usize,

    /// Seconds to wait for workers and runtimes to stop after each run.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Seed for the random values. Both runs use the same seed, so they check
    /// the same sequence. Random when omitted.
    ///
    /// Environment variable: `SEED`
    #[arg(short, long, env = "SEED")]
    pub seed: Option<u64>,

    /// Print a JSON summary instead of plain text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub pipeline: PipelineConfig,
    pub seed: u64,
    pub json: bool,
}

impl TryFrom<CliArgs> for DriverConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let pipeline = PipelineConfig {
            count: args.count,
            max_value: args.max_value,
            parallelism: args
                .parallelism
                .unwrap_or_else(|| PipelineConfig::default().parallelism),
            overflow_policy: args.overflow_policy,
            low_water_mark: args.low_water_mark,
            refill_batch: args.refill_batch,
            backpressure_enabled: !args.no_backpressure,
            worker_buffer: args.worker_buffer,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        };
        pipeline
            .validate()
            .context("invalid pipeline configuration")?;

        Ok(Self {
            pipeline,
            seed: args
                .seed
                .unwrap_or_else(|| ThreadRandom.rand_in(0..=u64::MAX)),
            json: args.json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<DriverConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("primeflow").chain(args.iter().copied()))?;
        DriverConfig::try_from(args)
    }

    #[test]
    fn defaults_match_the_library() {
        let config = parse(&["--seed", "1"]).unwrap();
        assert_eq!(config.pipeline.count, 50);
        assert_eq!(config.pipeline.max_value, 100_000);
        assert_eq!(config.pipeline.overflow_policy, OverflowPolicy::PushPull);
        assert_eq!(config.pipeline.parallelism, PipelineConfig::default().parallelism);
        assert!(config.pipeline.backpressure_enabled);
        assert_eq!(config.seed, 1);
        assert!(!config.json);
    }

    #[test]
    fn parses_policies_and_flags() {
        let config = parse(&[
            "--count",
            "10",
            "--overflow-policy",
            "DROP",
            "--parallelism",
            "3",
            "--no-backpressure",
            "--json",
        ])
        .unwrap();

        assert_eq!(config.pipeline.count, 10);
        assert_eq!(config.pipeline.overflow_policy, OverflowPolicy::Drop);
        assert_eq!(config.pipeline.parallelism, 3);
        assert!(!config.pipeline.backpressure_enabled);
        assert!(config.json);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--max-value", "1"]).is_err());
        assert!(parse(&["--parallelism", "0"]).is_err());
        assert!(parse(&["--refill-batch", "0"]).is_err());
        assert!(parse(&["--worker-buffer", "0"]).is_err());
        assert!(parse(&["--overflow-policy", "sideways"]).is_err());
    }

    #[test]
    fn validation_errors_name_the_field() {
        for (flag, field) in [
            ("--max-value", "max_value"),
            ("--parallelism", "parallelism"),
            ("--refill-batch", "refill_batch"),
            ("--worker-buffer", "worker_buffer"),
        ] {
            let err = parse(&[flag, "0"]).unwrap_err();
            let message = format!("{err:#}");
            assert!(message.starts_with("invalid pipeline configuration"), "{message}");
            assert!(message.contains(field), "{message}");
        }
    }
}
