#![doc = include_str!("../README.md")]

mod config;
mod report;
mod telemetry;
mod timing;

use clap::Parser;
use config::{CliArgs, DriverConfig};
use primeflow::{
    MemoizedOracle, Memoizer, Outcome, PrimeChecker, PrimeOracle, SeededRandom,
    run_pipeline_with_sink,
};
use report::{RunSummary, Slices, Summary, exit_string};
use std::sync::Arc;
use telemetry::{TelemetryProviders, init_telemetry};
use timing::Timings;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const TEST_WITH_MEMOIZER: &str = "test with memoizer";
const TEST_WITHOUT_MEMOIZER: &str = "test without memoizer";

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DriverConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let result = run(&config);
    shutdown(providers);
    result
}

fn log_startup_info(config: &DriverConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting primeflow with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting primeflow with {} items, {} workers, {} policy, seed {}",
            config.pipeline.count,
            config.pipeline.parallelism,
            config.pipeline.effective_policy(),
            config.seed
        );
    }
}

/// Times a memoized run and a raw-oracle run over the same seeded sequence,
/// then prints the timings and slices the memoizer's cache.
fn run(config: &DriverConfig) -> anyhow::Result<()> {
    let mut timings = Timings::default();
    let mut runs = Vec::with_capacity(2);

    let memoizer = Arc::new(Memoizer::new());
    runs.push(run_test(
        config,
        &mut timings,
        TEST_WITH_MEMOIZER,
        MemoizedOracle::new(Arc::clone(&memoizer)),
        true,
    ));

    // Copy the cache before the shutdown clears it.
    let cache = memoizer.snapshot();
    memoizer.shutdown();

    runs.push(run_test(
        config,
        &mut timings,
        TEST_WITHOUT_MEMOIZER,
        PrimeOracle,
        false,
    ));

    let slices = Slices::from_cache(&cache);

    if config.json {
        let summary = Summary {
            config: &config.pipeline,
            seed: config.seed,
            runs,
            timings: timings.sorted(),
            slices,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print!("{timings}");
    println!(
        "map with {} elements sorted by value = {:?}",
        slices.sorted.len(),
        slices.sorted
    );
    println!("primes = {:?}", slices.primes);
    println!("non-primes = {:?}", slices.non_primes);
    Ok(())
}

/// Runs one timed pipeline and prints its exit line.
///
/// A failed run (e.g. an overflow under the `error` policy) is reported, not
/// propagated, so the remaining run still happens.
#[tracing::instrument(skip_all, fields(test = test))]
fn run_test<C>(
    config: &DriverConfig,
    timings: &mut Timings,
    test: &'static str,
    checker: C,
    memoized: bool,
) -> RunSummary
where
    C: PrimeChecker + 'static,
{
    tracing::info!("Starting {test} with count = {}", config.pipeline.count);
    telemetry::increment_runs(test);

    let result = timings.time(test, || {
        run_pipeline_with_sink(
            &config.pipeline,
            checker,
            SeededRandom::new(config.seed),
            log_outcome,
        )
    });

    match result {
        Ok(report) => {
            telemetry::record_run_duration(test, report.elapsed.as_secs_f64() * 1_000.0);
            telemetry::record_checks(
                test,
                report.len() as u64,
                report.fresh_computations,
                report.cache_hits,
            );
            tracing::info!(
                "{test} {} with {} outcomes ({} primes)",
                report.state,
                report.len(),
                report.primes().count()
            );

            let line = exit_string(
                test,
                report.fresh_computations,
                config.pipeline.count,
                config.pipeline.effective_policy(),
                memoized,
            );
            if !config.json {
                println!("{line}");
            }
            RunSummary::from_report(test, &report, &config.pipeline, memoized)
        }
        Err(e) => {
            telemetry::increment_run_failures(test);
            tracing::error!("{test} failed: {e}");
            if !config.json {
                println!("Leaving {test} after failure: {e}");
            }
            RunSummary::failed(test, &e)
        }
    }
}

fn log_outcome(outcome: &Outcome) {
    tracing::debug!(
        sequence = outcome.item.sequence,
        value = outcome.item.value,
        factor = outcome.factor,
        from_cache = outcome.from_cache,
        "checked"
    );
}

fn shutdown(providers: TelemetryProviders) {
    providers.shutdown();
    tracing::debug!("Telemetry shut down");
}
