use crate::{
    HybridSubscriber, Outcome, PipelineConfig, PrimeChecker, Publisher, RandSource, Result,
    RunReport,
};

/// Runs one publisher/subscriber pipeline to completion.
///
/// Starts a publisher for `config`, subscribes a [`HybridSubscriber`] using
/// `checker`, waits for the run to settle, then stops and disposes both
/// sides. Must be called from outside any runtime.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for a configuration that does not
/// validate, and otherwise the first error of a failed run.
///
/// [`Error::InvalidConfig`]: crate::Error::InvalidConfig
///
/// # Example
/// ```
/// use primeflow::{PipelineConfig, PrimeOracle, SeededRandom, run_pipeline};
///
/// let config = PipelineConfig {
///     count: 10,
///     max_value: 1_000,
///     parallelism: 2,
///     ..PipelineConfig::default()
/// };
/// let report = run_pipeline(&config, PrimeOracle, SeededRandom::new(1)).unwrap();
/// assert_eq!(report.len(), 10);
/// ```
pub fn run_pipeline<C, R>(config: &PipelineConfig, checker: C, rand: R) -> Result<RunReport>
where
    C: PrimeChecker + 'static,
    R: RandSource + 'static,
{
    let subscriber = HybridSubscriber::new(checker, config)?;
    drive(config, subscriber, rand)
}

/// Like [`run_pipeline`], invoking `sink` for every outcome as it is
/// recorded.
///
/// # Errors
///
/// See [`run_pipeline`].
pub fn run_pipeline_with_sink<C, R, F>(
    config: &PipelineConfig,
    checker: C,
    rand: R,
    sink: F,
) -> Result<RunReport>
where
    C: PrimeChecker + 'static,
    R: RandSource + 'static,
    F: Fn(&Outcome) + Send + Sync + 'static,
{
    let subscriber = HybridSubscriber::new(checker, config)?.with_sink(sink);
    drive(config, subscriber, rand)
}

#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "debug", skip_all, fields(count = config.count, policy = %config.effective_policy()))
)]
fn drive<R>(config: &PipelineConfig, subscriber: HybridSubscriber, rand: R) -> Result<RunReport>
where
    R: RandSource + 'static,
{
    let publisher = Publisher::from_config(config, rand)?;
    let sequence = publisher.start(config.count, config.max_value, config.backpressure_enabled)?;

    let report = subscriber.subscribe(sequence).and_then(|()| subscriber.wait());

    publisher.stop();
    subscriber.dispose();
    publisher.dispose();

    #[cfg(feature = "tracing")]
    {
        match &report {
            Ok(report) => tracing::debug!(
                "Run {} with {} outcomes in {:?}",
                report.state,
                report.len(),
                report.elapsed
            ),
            Err(e) => tracing::debug!("Run failed: {e}"),
        }
    }

    report
}
