//! Run orchestration: enumerate the configured benchmark combinations, run
//! them over per-node arenas, and emit results.
//!
//! The suite owns every arena for the whole run. Each benchmark receives a
//! non-owning view of its node's region and partitions it among workers.

use crate::arena::Arena;
use crate::bench::{BenchmarkParams, LatencyBenchmark, ThroughputBenchmark};
use crate::config::RunConfig;
use crate::kernels::{
    ChunkSize, Pattern, RwMode, SUPPORTED_DELAYS, chunk_supported, resolve_delay_injected,
    resolve_random, resolve_sequential,
};
use crate::power::{PowerReader, discover_power_samplers};
use crate::report::ResultsFile;
use crate::topology::SystemTopology;
use crate::worker::{SendPtr, TimingMode};

/// Owns the run: topology, arenas, power readers, results file, test index.
pub struct BenchmarkSuite {
    config: RunConfig,
    topology: SystemTopology,
    /// One arena per enabled memory node, in node order.
    arenas: Vec<Arena>,
    nodes: Vec<u32>,
    power_readers: Vec<PowerReader>,
    results: Option<ResultsFile>,
    timing_mode: TimingMode,
    test_index: u32,
}

impl BenchmarkSuite {
    /// Probe the machine, validate the configuration, and allocate one arena
    /// per enabled node. Allocation failure is fatal: no partial run.
    pub fn new(config: RunConfig) -> Result<Self, String> {
        let topology = SystemTopology::probe();
        config.validate(&topology)?;

        let nodes: Vec<u32> = if config.numa_enabled {
            (0..topology.num_numa_nodes).collect()
        } else {
            vec![0]
        };

        let mut arenas = Vec::with_capacity(nodes.len());
        for &node in &nodes {
            let arena = Arena::allocate(
                node,
                config.bytes_per_node(),
                config.use_large_pages,
                config.numa_enabled,
                &topology,
            )?;
            if config.numa_enabled && !arena.numa_local() {
                log::warn!("arena for node {node} fell back to UMA placement");
            }
            arenas.push(arena);
        }

        let power_readers: Vec<PowerReader> =
            discover_power_samplers(topology.num_physical_packages)
                .into_iter()
                .map(PowerReader::new)
                .collect();

        let results = match &config.output_file {
            Some(path) => {
                let socket_names: Vec<String> =
                    power_readers.iter().map(|r| r.name()).collect();
                match ResultsFile::create(path, &socket_names) {
                    Ok(file) => Some(file),
                    Err(err) => {
                        log::warn!(
                            "failed to open {} for writing ({err}); no results file \
                             will be generated",
                            path.display()
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let test_index = config.base_test_index;
        Ok(Self {
            config,
            topology,
            arenas,
            nodes,
            power_readers,
            results,
            timing_mode: TimingMode::for_benchmark_duration(),
            test_index,
        })
    }

    /// Override the worker timing mode (size-based operation).
    pub fn with_timing_mode(mut self, mode: TimingMode) -> Self {
        self.timing_mode = mode;
        self
    }

    pub fn topology(&self) -> &SystemTopology {
        &self.topology
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every enumerated benchmark. Unsupported combinations are skipped;
    /// anything else that fails stops the run.
    pub fn run_all(&mut self) -> Result<(), String> {
        if self.config.run_throughput {
            self.run_throughput_benchmarks()?;
        }
        if self.config.run_latency {
            self.run_latency_benchmarks()?;
        }
        Ok(())
    }

    fn next_name(&mut self, kind: &str) -> String {
        let name = format!("Test #{} ({kind})", self.test_index);
        self.test_index += 1;
        name
    }

    fn run_throughput_benchmarks(&mut self) -> Result<(), String> {
        let rw_modes: Vec<RwMode> = [
            (self.config.use_reads, RwMode::Read),
            (self.config.use_writes, RwMode::Write),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|&(_, rw)| rw)
        .collect();

        for mem_idx in 0..self.nodes.len() {
            let mem_node = self.nodes[mem_idx];
            for cpu_idx in 0..self.nodes.len() {
                let cpu_node = self.nodes[cpu_idx];
                for &rw in &rw_modes {
                    for chunk_idx in 0..self.config.chunk_sizes.len() {
                        let chunk = self.config.chunk_sizes[chunk_idx];

                        if self.config.use_sequential_access {
                            for stride_idx in 0..self.config.strides.len() {
                                let stride = self.config.strides[stride_idx];
                                if resolve_sequential(rw, chunk, stride).is_none() {
                                    log::warn!(
                                        "skipping unsupported combination: sequential \
                                         {rw} chunk {chunk} stride {stride}"
                                    );
                                    continue;
                                }
                                self.run_one_throughput(
                                    mem_idx,
                                    mem_node,
                                    cpu_node,
                                    rw,
                                    chunk,
                                    Pattern::Sequential,
                                    stride,
                                )?;
                            }
                        }

                        if self.config.use_random_access {
                            if resolve_random(rw, chunk).is_none() {
                                log::warn!(
                                    "skipping unsupported combination: random {rw} \
                                     chunk {chunk}"
                                );
                                continue;
                            }
                            self.run_one_throughput(
                                mem_idx,
                                mem_node,
                                cpu_node,
                                rw,
                                chunk,
                                Pattern::Random,
                                0,
                            )?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_one_throughput(
        &mut self,
        mem_idx: usize,
        mem_node: u32,
        cpu_node: u32,
        rw: RwMode,
        chunk: ChunkSize,
        pattern: Pattern,
        stride: i64,
    ) -> Result<(), String> {
        let name = self.next_name("Throughput");
        let params = BenchmarkParams {
            name,
            chunk,
            pattern,
            rw,
            stride,
            mem_node,
            cpu_node,
            num_worker_threads: self.config.num_worker_threads,
            iterations: self.config.iterations,
        };

        let mut bench = ThroughputBenchmark::new(params);
        let arena = &self.arenas[mem_idx];
        bench.run(
            SendPtr(arena.base()),
            self.config.bytes_per_node(),
            &self.topology,
            &self.power_readers,
            self.timing_mode,
            None,
        )?;
        bench.report();

        if let Some(results) = &mut self.results {
            if let Err(err) = results.append_throughput_row(
                bench.params(),
                bench.outcome(),
                self.config.working_set_size_per_thread,
            ) {
                log::warn!("failed to append a results row: {err}");
            }
        }
        Ok(())
    }

    fn run_latency_benchmarks(&mut self) -> Result<(), String> {
        let loaded = self.config.num_worker_threads > 1;
        let load_chunk = self.load_chunk();

        for mem_idx in 0..self.nodes.len() {
            let mem_node = self.nodes[mem_idx];
            for cpu_idx in 0..self.nodes.len() {
                let cpu_node = self.nodes[cpu_idx];
                if loaded {
                    for &delay in SUPPORTED_DELAYS.iter() {
                        if resolve_delay_injected(load_chunk, delay).is_none() {
                            log::warn!(
                                "skipping unsupported load kernel: chunk {load_chunk} \
                                 delay {delay}"
                            );
                            continue;
                        }
                        self.run_one_latency(
                            mem_idx,
                            mem_node,
                            cpu_node,
                            load_chunk,
                            Some(delay),
                        )?;
                    }
                } else {
                    self.run_one_latency(mem_idx, mem_node, cpu_node, load_chunk, None)?;
                }
            }
        }
        Ok(())
    }

    /// Chunk used by loaded-latency background workers: the widest the user
    /// asked for that has delay variants, 64-bit by default.
    fn load_chunk(&self) -> ChunkSize {
        if self.config.chunk_sizes.contains(&ChunkSize::Bits256)
            && !self.config.chunk_sizes.contains(&ChunkSize::Bits64)
            && chunk_supported(ChunkSize::Bits256)
        {
            ChunkSize::Bits256
        } else {
            ChunkSize::Bits64
        }
    }

    fn run_one_latency(
        &mut self,
        mem_idx: usize,
        mem_node: u32,
        cpu_node: u32,
        chunk: ChunkSize,
        delay: Option<u32>,
    ) -> Result<(), String> {
        let name = match delay {
            Some(d) => {
                let name = self.next_name("Loaded Latency");
                format!("{name} delay {d}")
            }
            None => self.next_name("Latency"),
        };
        let params = BenchmarkParams {
            name,
            chunk,
            pattern: Pattern::Random,
            rw: RwMode::Read,
            stride: 0,
            mem_node,
            cpu_node,
            num_worker_threads: self.config.num_worker_threads,
            iterations: self.config.iterations,
        };

        let mut bench = LatencyBenchmark::new(params, delay);
        let arena = &self.arenas[mem_idx];
        bench.run(
            SendPtr(arena.base()),
            self.config.bytes_per_node(),
            &self.topology,
            &self.power_readers,
            self.timing_mode,
            None,
        )?;
        bench.report();

        if let Some(results) = &mut self.results {
            if let Err(err) = results.append_latency_row(
                bench.params(),
                bench.outcome(),
                self.config.working_set_size_per_thread,
            ) {
                log::warn!("failed to append a results row: {err}");
            }
        }
        Ok(())
    }
}
