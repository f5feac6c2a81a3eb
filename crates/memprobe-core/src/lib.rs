//! # memprobe-core
//!
//! **Measure your memory hierarchy.**
//!
//! `memprobe-core` is the measurement engine behind the `memprobe` CLI: a
//! library of hand-unrolled memory access kernels, NUMA-aware arenas, pinned
//! worker threads, and benchmark drivers that together characterize cache and
//! DRAM **throughput** (MB/s) and **latency** (ns/access) under controlled
//! access patterns, granularities, strides, and thread counts.
//!
//! ## Quick start
//!
//! ```no_run
//! use memprobe_core::config::RunConfig;
//! use memprobe_core::runner::BenchmarkSuite;
//!
//! let config = RunConfig::default();
//! let mut suite = BenchmarkSuite::new(config).expect("allocation failed");
//! suite.run_all().expect("benchmarks failed");
//! ```
//!
//! ## Architecture
//!
//! Orchestrator → Arenas (one per NUMA node) → Benchmarks → Workers →
//! Kernels, timed between serialized tick reads and corrected against dummy
//! kernels that replay the loop without the memory accesses.
//!
//! Every timed routine lives in [`kernels`]; everything else exists to place
//! memory, place threads, and account for what the kernels did.

pub mod affinity;
pub mod arena;
pub mod bench;
pub mod config;
pub mod graph;
pub mod kernels;
pub mod power;
pub mod report;
pub mod runner;
pub mod timer;
pub mod topology;
pub mod worker;

pub use arena::{Arena, PageClass};
pub use bench::{BenchmarkOutcome, BenchmarkParams, MetricUnits};
pub use graph::build_random_pointer_permutation;
pub use kernels::{ChunkSize, Pattern, RwMode};
pub use timer::timer;
pub use topology::SystemTopology;

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wall-clock length of one time-based benchmark iteration.
pub const BENCHMARK_DURATION_MS: u64 = 4000;

/// Bytes touched per pass of a throughput worker. Must not exceed the
/// smallest legal working set size (one page).
pub const THROUGHPUT_BENCHMARK_BYTES_PER_PASS: usize = 4096;

/// Sampling period of the DRAM power readers, in seconds.
pub const POWER_SAMPLING_PERIOD_SEC: f64 = 1.0;

/// Measurements with fewer elapsed ticks than this are flagged: the timer's
/// own latency is no longer negligible at that scale.
pub const MIN_ELAPSED_TICKS: u64 = 10_000;

/// Pointers followed per latency-kernel invocation.
pub const LATENCY_BENCHMARK_UNROLL_LENGTH: u64 = 512;
