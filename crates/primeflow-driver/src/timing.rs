use core::{fmt, time::Duration};
use serde::Serialize;
use std::time::Instant;

/// How long one named run took.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub name: &'static str,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1_000.0)
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} executed in {} msecs", self.name, self.elapsed.as_millis())
    }
}

/// Wall-clock timings of the driver's runs.
#[derive(Debug, Default)]
pub struct Timings {
    entries: Vec<Timing>,
}

impl Timings {
    /// Runs `f`, recording its duration under `name`.
    pub fn time<T>(&mut self, name: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&mut self, name: &'static str, elapsed: Duration) {
        self.entries.push(Timing { name, elapsed });
    }

    /// Timings ordered fastest first.
    pub fn sorted(&self) -> Vec<Timing> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|timing| timing.elapsed);
        entries
    }
}

impl fmt::Display for Timings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Printing {} results from fastest to slowest", self.entries.len())?;
        for timing in self.sorted() {
            writeln!(f, "{timing}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_fastest_first() {
        let mut timings = Timings::default();
        timings.record("slow", Duration::from_millis(30));
        timings.record("fast", Duration::from_millis(10));
        timings.record("middle", Duration::from_millis(20));

        let names: Vec<_> = timings.sorted().iter().map(|t| t.name).collect();
        assert_eq!(names, ["fast", "middle", "slow"]);
    }

    #[test]
    fn time_records_and_passes_through() {
        let mut timings = Timings::default();
        let value = timings.time("work", || {
            std::thread::sleep(Duration::from_millis(5));
            7
        });

        assert_eq!(value, 7);
        let sorted = timings.sorted();
        assert_eq!(sorted.len(), 1);
        assert!(sorted[0].elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn display_lists_every_run() {
        let mut timings = Timings::default();
        timings.record("test with memoizer", Duration::from_millis(12));
        timings.record("test without memoizer", Duration::from_millis(3));

        let text = timings.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Printing 2 results from fastest to slowest");
        assert_eq!(lines[1], "test without memoizer executed in 3 msecs");
        assert_eq!(lines[2], "test with memoizer executed in 12 msecs");
    }
}
