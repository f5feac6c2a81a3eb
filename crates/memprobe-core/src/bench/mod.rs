//! Benchmark drivers: spawn workers over an arena slice, aggregate their
//! records across iterations, and compute the figure of merit.

pub mod latency;
pub mod throughput;

pub use latency::LatencyBenchmark;
pub use throughput::ThroughputBenchmark;

use std::fmt;

use crate::kernels::{ChunkSize, Pattern, RwMode};
use crate::power::PowerReader;

/// Unit of a benchmark's figure of merit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnits {
    MegabytesPerSecond,
    NanosecondsPerAccess,
}

impl fmt::Display for MetricUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MegabytesPerSecond => write!(f, "MB/s"),
            Self::NanosecondsPerAccess => write!(f, "ns/access"),
        }
    }
}

/// The full configuration of one benchmark in the run's enumeration.
#[derive(Debug, Clone)]
pub struct BenchmarkParams {
    pub name: String,
    pub chunk: ChunkSize,
    pub pattern: Pattern,
    pub rw: RwMode,
    /// Stride in chunks, signed for direction. Meaningless for random
    /// patterns.
    pub stride: i64,
    pub mem_node: u32,
    pub cpu_node: u32,
    pub num_worker_threads: u32,
    pub iterations: u32,
}

/// What a benchmark produced: one metric per iteration, their mean, and the
/// power trace summaries spanning all iterations.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkOutcome {
    pub metric_on_iter: Vec<f64>,
    pub avg_metric: f64,
    pub avg_power: Vec<f64>,
    pub peak_power: Vec<f64>,
    /// Aggregate background-load throughput in MB/s, present only for
    /// loaded-latency runs.
    pub load_metric: Option<f64>,
    pub warning: bool,
    pub has_run: bool,
}

/// Bytes per megabyte, for the throughput figure of merit.
pub(crate) const MB: f64 = 1_048_576.0;

pub(crate) fn reset_power_readers(readers: &[PowerReader]) {
    for reader in readers {
        reader.clear_and_reset();
    }
}

pub(crate) fn start_power_readers(readers: &[PowerReader]) {
    for reader in readers {
        reader.start();
    }
}

pub(crate) fn stop_power_readers(readers: &[PowerReader]) {
    for reader in readers {
        reader.stop();
    }
}

pub(crate) fn collect_power(readers: &[PowerReader], outcome: &mut BenchmarkOutcome) {
    outcome.avg_power = readers.iter().map(|r| r.average_power()).collect();
    outcome.peak_power = readers.iter().map(|r| r.peak_power()).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_render_as_csv_labels() {
        assert_eq!(MetricUnits::MegabytesPerSecond.to_string(), "MB/s");
        assert_eq!(MetricUnits::NanosecondsPerAccess.to_string(), "ns/access");
    }

    #[test]
    fn outcome_defaults_are_inert() {
        let outcome = BenchmarkOutcome::default();
        assert!(!outcome.has_run);
        assert!(!outcome.warning);
        assert_eq!(outcome.avg_metric, 0.0);
        assert!(outcome.metric_on_iter.is_empty());
        assert!(outcome.load_metric.is_none());
    }
}
