//! Latency benchmark driver: unloaded pointer chasing, optionally with
//! delay-injected background load workers.
//!
//! One worker chases a 64-bit pointer permutation and yields nanoseconds per
//! access. With more than one worker thread, the remaining threads run
//! forward-sequential read kernels padded with a configurable number of nops,
//! loading the memory system while the chase is measured. The chase worker
//! gets its own slice and its permutation is built over that slice alone, so
//! the measured region never overlaps the load regions.

use std::sync::Arc;
use std::thread;

use super::{
    BenchmarkOutcome, BenchmarkParams, MB, collect_power, reset_power_readers,
    start_power_readers, stop_power_readers,
};
use crate::graph::build_random_pointer_permutation;
use crate::kernels::{ChunkSize, RwMode, resolve_delay_injected, resolve_random};
use crate::power::PowerReader;
use crate::timer::timer;
use crate::topology::SystemTopology;
use crate::worker::{LatencyWorker, SendPtr, ThroughputWorker, TimingMode, WorkerKernel};

pub struct LatencyBenchmark {
    params: BenchmarkParams,
    /// Nops per access in the load workers. `None` for an unloaded run.
    delay: Option<u32>,
    outcome: BenchmarkOutcome,
}

impl LatencyBenchmark {
    pub fn new(params: BenchmarkParams, delay: Option<u32>) -> Self {
        Self {
            params,
            delay,
            outcome: BenchmarkOutcome::default(),
        }
    }

    pub fn params(&self) -> &BenchmarkParams {
        &self.params
    }

    pub fn delay(&self) -> Option<u32> {
        self.delay
    }

    pub fn outcome(&self) -> &BenchmarkOutcome {
        &self.outcome
    }

    pub fn is_loaded(&self) -> bool {
        self.params.num_worker_threads > 1
    }

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

        // The chase is always 64-bit: a pointer must fit in one chunk.
        let chase_pair = resolve_random(RwMode::Read, ChunkSize::Bits64)
            .ok_or_else(|| "no pointer-chase kernel on this machine".to_string())?;

        let num_threads = self.params.num_worker_threads.max(1) as usize;
        let len_per_thread = len / num_threads;
        if len_per_thread == 0 {
            return Err("memory region smaller than one slice per worker".to_string());
        }

        let load_pair = if num_threads > 1 {
            let delay = self.delay.unwrap_or(0);
            Some(
                resolve_delay_injected(self.params.chunk, delay).ok_or_else(|| {
                    format!(
                        "no delay-{delay} load kernel for chunk {} on this machine",
                        self.params.chunk
                    )
                })?,
            )
        } else {
            None
        };

        // The measured region is the chase worker's slice only.
        if !build_random_pointer_permutation(mem.0, len_per_thread, ChunkSize::Bits64, graph_seed)
        {
            return Err("failed to build the pointer permutation".to_string());
        }

        reset_power_readers(power_readers);

        for _ in 0..self.params.iterations {
            start_power_readers(power_readers);

            let lat_worker = Arc::new(LatencyWorker::new(
                mem,
                len_per_thread,
                chase_pair,
                topology.cpu_in_node(self.params.cpu_node, 0),
                mode,
            ));
            let accesses_per_pass = lat_worker.accesses_per_pass();

            let load_workers: Vec<Arc<ThroughputWorker>> = (1..num_threads)
                .map(|t| {
                    let pair = load_pair.expect("load workers require a load kernel");
                    let cpu_id = topology.cpu_in_node(self.params.cpu_node, t as u32);
                    if cpu_id.is_none() {
                        log::warn!(
                            "no logical CPU {} in NUMA node {}; load worker runs unpinned",
                            t,
                            self.params.cpu_node
                        );
                    }
                    let slice = SendPtr(unsafe { mem.0.add(t * len_per_thread) });
                    Arc::new(ThroughputWorker::new(
                        slice,
                        len_per_thread,
                        WorkerKernel::Sequential(pair),
                        cpu_id,
                        mode,
                    ))
                })
                .collect();

            let mut handles = Vec::with_capacity(num_threads);
            {
                let w = lat_worker.clone();
                handles.push(thread::spawn(move || w.run()));
            }
            for worker in &load_workers {
                let w = worker.clone();
                handles.push(thread::spawn(move || w.run()));
            }
            for handle in handles {
                if handle.join().is_err() {
                    return Err("a worker thread panicked".to_string());
                }
            }

            stop_power_readers(power_readers);

            let record = lat_worker.record();
            debug_assert!(record.completed);
            let accesses = record.passes * accesses_per_pass;
            let metric = if accesses == 0 {
                0.0
            } else {
                record.adjusted_ticks as f64 * timer().ns_per_tick() / accesses as f64
            };
            self.outcome.metric_on_iter.push(metric);
            self.outcome.warning |= record.warning;

            if !load_workers.is_empty() {
                let mut total_passes: u64 = 0;
                let mut total_adjusted: u64 = 0;
                let mut bytes_per_pass: u64 = 0;
                for worker in &load_workers {
                    let r = worker.record();
                    total_passes += r.passes;
                    total_adjusted += r.adjusted_ticks;
                    bytes_per_pass = r.bytes_per_pass;
                    self.outcome.warning |= r.warning;
                }
                let avg_adjusted = total_adjusted / load_workers.len() as u64;
                let load_metric = if avg_adjusted == 0 || total_passes == 0 {
                    0.0
                } else {
                    (total_passes as f64 * bytes_per_pass as f64 / MB)
                        / (avg_adjusted as f64 * timer().ns_per_tick() / 1e9)
                };
                // Averaged below alongside the latency metric.
                self.outcome.load_metric =
                    Some(self.outcome.load_metric.unwrap_or(0.0) + load_metric);
            }
        }

        collect_power(power_readers, &mut self.outcome);
        let iters = self.params.iterations.max(1) as f64;
        self.outcome.avg_metric = self.outcome.metric_on_iter.iter().sum::<f64>() / iters;
        self.outcome.load_metric = self.outcome.load_metric.map(|sum| sum / iters);
        self.outcome.has_run = true;
        Ok(())
    }

    pub fn report(&self) {
        println!("-------- {} --------", self.params.name);
        println!("CPU NUMA node: {}", self.params.cpu_node);
        println!("Memory NUMA node: {}", self.params.mem_node);
        match self.delay {
            Some(delay) if self.is_loaded() => println!(
                "Pattern: random pointer chasing under load ({} load threads, delay {delay})",
                self.params.num_worker_threads - 1
            ),
            _ => println!("Pattern: random pointer chasing, unloaded"),
        }
        for (i, metric) in self.outcome.metric_on_iter.iter().enumerate() {
            println!("Iter #{}: {:.2} ns/access", i + 1, metric);
        }
        print!("Average: {:.2} ns/access", self.outcome.avg_metric);
        if let Some(load) = self.outcome.load_metric {
            print!(" | background load: {load:.2} MB/s");
        }
        if self.outcome.warning {
            print!(" -- WARNING");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::Pattern;

    fn params(threads: u32) -> BenchmarkParams {
        BenchmarkParams {
            name: "Test #2 (Latency)".to_string(),
            chunk: ChunkSize::Bits64,
            pattern: Pattern::Random,
            rw: RwMode::Read,
            stride: 0,
            mem_node: 0,
            cpu_node: 0,
            num_worker_threads: threads,
            iterations: 1,
        }
    }

    #[repr(C, align(4096))]
    struct Region {
        bytes: [u8; 4 * 4096 + 64],
    }

    fn region() -> Box<Region> {
        Box::new(Region {
            bytes: [0; 4 * 4096 + 64],
        })
    }

    #[test]
    fn unloaded_latency_yields_a_metric() {
        let mut buf = region();
        let topology = SystemTopology::probe();
        let mut bench = LatencyBenchmark::new(params(1), None);
        bench
            .run(
                SendPtr(buf.bytes.as_mut_ptr()),
                4 * 4096,
                &topology,
                &[],
                TimingMode::SizeBased { passes: 2 },
                Some(21),
            )
            .unwrap();

        let outcome = bench.outcome();
        assert!(outcome.has_run);
        assert_eq!(outcome.metric_on_iter.len(), 1);
        assert!(outcome.avg_metric >= 0.0);
        assert!(outcome.avg_metric.is_finite());
        assert!(outcome.load_metric.is_none());
    }

    #[test]
    fn loaded_latency_reports_both_metrics() {
        let mut buf = region();
        let topology = SystemTopology::probe();
        let mut bench = LatencyBenchmark::new(params(2), Some(0));
        assert!(bench.is_loaded());
        bench
            .run(
                SendPtr(buf.bytes.as_mut_ptr()),
                4 * 4096,
                &topology,
                &[],
                TimingMode::SizeBased { passes: 2 },
                Some(22),
            )
            .unwrap();

        let outcome = bench.outcome();
        assert!(outcome.has_run);
        assert!(outcome.load_metric.is_some());
        assert!(outcome.load_metric.unwrap() >= 0.0);
    }

    #[test]
    fn loaded_latency_with_injected_delay_runs() {
        #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
        {
            let mut buf = region();
            let topology = SystemTopology::probe();
            let mut bench = LatencyBenchmark::new(params(2), Some(16));
            bench
                .run(
                    SendPtr(buf.bytes.as_mut_ptr()),
                    4 * 4096,
                    &topology,
                    &[],
                    TimingMode::SizeBased { passes: 1 },
                    Some(23),
                )
                .unwrap();
            assert!(bench.outcome().has_run);
        }
    }

    #[test]
    fn latency_benchmark_runs_only_once() {
        let mut buf = region();
        let topology = SystemTopology::probe();
        let mut bench = LatencyBenchmark::new(params(1), None);
        let mem = SendPtr(buf.bytes.as_mut_ptr());
        bench
            .run(
                mem,
                4 * 4096,
                &topology,
                &[],
                TimingMode::SizeBased { passes: 1 },
                Some(1),
            )
            .unwrap();
        assert!(
            bench
                .run(
                    mem,
                    4 * 4096,
                    &topology,
                    &[],
                    TimingMode::SizeBased { passes: 1 },
                    Some(1),
                )
                .is_err()
        );
    }
}
