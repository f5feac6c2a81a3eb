//! Aggregate-throughput benchmark driver.
//!
//! Partitions its memory view into one contiguous slice per worker, binds
//! each worker to a distinct CPU of the configured node, and reports the
//! combined access rate in MB/s, averaged over iterations.

use std::sync::Arc;
use std::thread;

use super::{
    BenchmarkOutcome, BenchmarkParams, MB, collect_power, reset_power_readers,
    start_power_readers, stop_power_readers,
};
use crate::graph::build_random_pointer_permutation;
use crate::kernels::{Pattern, resolve_random, resolve_sequential};
use crate::power::PowerReader;
use crate::timer::timer;
use crate::topology::SystemTopology;
use crate::worker::{SendPtr, ThroughputWorker, TimingMode, WorkerKernel};

pub struct ThroughputBenchmark {
    params: BenchmarkParams,
    outcome: BenchmarkOutcome,
}

impl ThroughputBenchmark {
    pub fn new(params: BenchmarkParams) -> Self {
        Self {
            params,
            outcome: BenchmarkOutcome::default(),
        }
    }

    pub fn params(&self) -> &BenchmarkParams {
        &self.params
    }

    pub fn outcome(&self) -> &BenchmarkOutcome {
        &self.outcome
    }

    /// Run every iteration over `[mem, mem + len)`. A benchmark object runs
    /// once; `graph_seed` only matters for random patterns.
    pub fn run(
        &mut self,
        mem: SendPtr,
        len: usize,
        topology: &SystemTopology,
        power_readers: &[PowerReader],
        mode: TimingMode,
        graph_seed: Option<u64>,
    ) -> Result<(), String> {
        if self.outcome.has_run {
            return Err(format!("{} was already run", self.params.name));
        }

        let kernel = match self.params.pattern {
            Pattern::Sequential => WorkerKernel::Sequential(
                resolve_sequential(self.params.rw, self.params.chunk, self.params.stride)
                    .ok_or_else(|| {
                        format!(
                            "no sequential kernel for chunk {} stride {} on this machine",
                            self.params.chunk, self.params.stride
                        )
                    })?,
            ),
            Pattern::Random => WorkerKernel::Random(
                resolve_random(self.params.rw, self.params.chunk).ok_or_else(|| {
                    format!(
                        "no random kernel for chunk {} on this machine",
                        self.params.chunk
                    )
                })?,
            ),
        };

        let num_threads = self.params.num_worker_threads.max(1) as usize;
        let len_per_thread = len / num_threads;
        if len_per_thread == 0 {
            return Err("memory region smaller than one slice per worker".to_string());
        }

        if self.params.pattern == Pattern::Random
            && !build_random_pointer_permutation(mem.0, len, self.params.chunk, graph_seed)
        {
            return Err("failed to build the pointer permutation".to_string());
        }

        reset_power_readers(power_readers);

        for _ in 0..self.params.iterations {
            start_power_readers(power_readers);

            let workers: Vec<Arc<ThroughputWorker>> = (0..num_threads)
                .map(|t| {
                    let cpu_id = topology.cpu_in_node(self.params.cpu_node, t as u32);
                    if cpu_id.is_none() {
                        log::warn!(
                            "no logical CPU {} in NUMA node {}; worker runs unpinned",
                            t,
                            self.params.cpu_node
                        );
                    }
                    // SAFETY-relevant: slices are disjoint by construction.
                    let slice = SendPtr(unsafe { mem.0.add(t * len_per_thread) });
                    Arc::new(ThroughputWorker::new(
                        slice,
                        len_per_thread,
                        kernel,
                        cpu_id,
                        mode,
                    ))
                })
                .collect();

            let handles: Vec<_> = workers
                .iter()
                .map(|w| {
                    let w = w.clone();
                    thread::spawn(move || w.run())
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    return Err("a worker thread panicked".to_string());
                }
            }

            stop_power_readers(power_readers);

            let mut total_passes: u64 = 0;
            let mut total_adjusted_ticks: u64 = 0;
            let mut iter_warning = false;
            let bytes_per_pass = workers[0].record().bytes_per_pass;
            for worker in &workers {
                let record = worker.record();
                debug_assert!(record.completed);
                total_passes += record.passes;
                total_adjusted_ticks += record.adjusted_ticks;
                iter_warning |= record.warning;
            }
            let avg_adjusted_ticks = total_adjusted_ticks / num_threads as u64;

            let metric = if avg_adjusted_ticks == 0 || total_passes == 0 {
                0.0
            } else {
                (total_passes as f64 * bytes_per_pass as f64 / MB)
                    / (avg_adjusted_ticks as f64 * timer().ns_per_tick() / 1e9)
            };
            self.outcome.metric_on_iter.push(metric);
            self.outcome.warning |= iter_warning;
        }

        collect_power(power_readers, &mut self.outcome);
        self.outcome.avg_metric = self.outcome.metric_on_iter.iter().sum::<f64>()
            / self.params.iterations.max(1) as f64;
        self.outcome.has_run = true;
        Ok(())
    }

    /// Console summary in the style of the per-benchmark progress output.
    pub fn report(&self) {
        println!("-------- {} --------", self.params.name);
        println!("CPU NUMA node: {}", self.params.cpu_node);
        println!("Memory NUMA node: {}", self.params.mem_node);
        println!(
            "Pattern: {} | Mix: {} | Chunk: {} bits | Stride: {}",
            self.params.pattern, self.params.rw, self.params.chunk, self.params.stride
        );
        for (i, metric) in self.outcome.metric_on_iter.iter().enumerate() {
            println!("Iter #{}: {:.2} MB/s", i + 1, metric);
        }
        print!("Average: {:.2} MB/s", self.outcome.avg_metric);
        if self.outcome.warning {
            print!(" -- WARNING");
        }
        println!();
    }
}
