use crate::timing::Timing;
use primeflow::{EmitStats, OverflowPolicy, PipelineConfig, PipelineState, RunReport};
use serde::Serialize;
use std::collections::HashMap;

/// The line printed when a run finishes.
///
/// Duplicates are only meaningful when a memoizer absorbed them and the
/// policy delivered every item, so they are omitted otherwise.
pub fn exit_string(
    test: &str,
    prime_checks: u64,
    count: u64,
    policy: OverflowPolicy,
    memoized: bool,
) -> String {
    let prefix = format!("Leaving {test} with {prime_checks} prime checks");
    if memoized && !policy.is_lossy() {
        format!("{prefix} ({} duplicates)", count.saturating_sub(prime_checks))
    } else {
        prefix
    }
}

/// A memoizer cache sorted by factor and split into primes and non-primes.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct Slices {
    /// `(value, factor)` pairs ordered by factor, then value.
    pub sorted: Vec<(u64, u64)>,
    pub primes: Vec<u64>,
    pub non_primes: Vec<(u64, u64)>,
}

impl Slices {
    pub fn from_cache(cache: &HashMap<u64, u64>) -> Self {
        let mut sorted: Vec<_> = cache.iter().map(|(&value, &factor)| (value, factor)).collect();
        sorted.sort_unstable_by_key(|&(value, factor)| (factor, value));

        // Primes carry factor 0, so they lead the sorted entries.
        let primes = sorted
            .iter()
            .take_while(|&&(_, factor)| factor == 0)
            .map(|&(value, _)| value)
            .collect();
        let non_primes = sorted
            .iter()
            .skip_while(|&&(_, factor)| factor == 0)
            .copied()
            .collect();

        Self {
            sorted,
            primes,
            non_primes,
        }
    }
}

/// Outcome of one driver run, as printed under `--json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub test: &'static str,
    pub state: PipelineState,
    pub prime_checks: u64,
    pub cache_hits: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emitted: Option<EmitStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_report(test: &'static str, report: &RunReport, config: &PipelineConfig, memoized: bool) -> Self {
        let lossy = config.effective_policy().is_lossy();
        Self {
            test,
            state: report.state,
            prime_checks: report.fresh_computations,
            cache_hits: report.cache_hits,
            duplicates: (memoized && !lossy).then(|| config.count.saturating_sub(report.fresh_computations)),
            emitted: report.emitted,
            error: None,
        }
    }

    pub fn failed(test: &'static str, error: &primeflow::Error) -> Self {
        Self {
            test,
            state: PipelineState::Failed,
            prime_checks: 0,
            cache_hits: 0,
            duplicates: None,
            emitted: None,
            error: Some(error.to_string()),
        }
    }
}

/// Everything the driver reports under `--json`.
#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub config: &'a PipelineConfig,
    pub seed: u64,
    pub runs: Vec<RunSummary>,
    pub timings: Vec<Timing>,
    pub slices: Slices,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use primeflow::{Item, Outcome};

    #[test]
    fn memoized_lossless_run_reports_duplicates() {
        assert_eq!(
            exit_string("test with memoizer", 42, 50, OverflowPolicy::PushPull, true),
            "Leaving test with memoizer with 42 prime checks (8 duplicates)"
        );
    }

    #[test]
    fn lossy_or_raw_runs_omit_duplicates() {
        assert_eq!(
            exit_string("test with memoizer", 12, 50, OverflowPolicy::Drop, true),
            "Leaving test with memoizer with 12 prime checks"
        );
        assert_eq!(
            exit_string("test with memoizer", 12, 50, OverflowPolicy::Latest, true),
            "Leaving test with memoizer with 12 prime checks"
        );
        assert_eq!(
            exit_string("test without memoizer", 50, 50, OverflowPolicy::Buffer, false),
            "Leaving test without memoizer with 50 prime checks"
        );
    }

    #[test]
    fn slices_split_primes_from_non_primes() {
        let cache = HashMap::from([(15, 3), (17, 0), (4, 2), (13, 0), (49, 7), (9, 3)]);
        let slices = Slices::from_cache(&cache);

        assert_eq!(
            slices.sorted,
            [(13, 0), (17, 0), (4, 2), (9, 3), (15, 3), (49, 7)]
        );
        assert_eq!(slices.primes, [13, 17]);
        assert_eq!(slices.non_primes, [(4, 2), (9, 3), (15, 3), (49, 7)]);
    }

    #[test]
    fn empty_cache_has_empty_slices() {
        assert_eq!(Slices::from_cache(&HashMap::new()), Slices::default());
    }

    #[test]
    fn summary_counts_duplicates_from_fresh_checks() {
        let outcome = |sequence, value| Outcome {
            item: Item { sequence, value },
            factor: 0,
            from_cache: sequence > 0,
        };
        let report = RunReport {
            state: PipelineState::Completed,
            outcomes: vec![outcome(0, 7), outcome(1, 7), outcome(2, 7)],
            fresh_computations: 1,
            cache_hits: 2,
            emitted: None,
            elapsed: Duration::from_millis(1),
        };
        let config = PipelineConfig {
            count: 3,
            ..PipelineConfig::default()
        };

        let summary = RunSummary::from_report("test with memoizer", &report, &config, true);
        assert_eq!(summary.duplicates, Some(2));

        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["state"], "COMPLETED");
        assert_eq!(json["prime_checks"], 1);
        assert!(json.get("error").is_none());
    }
}
