//! CLI for memprobe — characterize cache and DRAM latency/throughput.

use std::path::PathBuf;

use clap::Parser;

use memprobe_core::config::RunConfig;
use memprobe_core::kernels::ChunkSize;
use memprobe_core::runner::BenchmarkSuite;
use memprobe_core::timer::timer;
use memprobe_core::topology::SystemTopology;

#[derive(Parser, Debug)]
#[command(name = "memprobe")]
#[command(about = "memprobe — measure your memory hierarchy")]
#[command(version = memprobe_core::VERSION)]
struct Cli {
    /// Run throughput benchmarks
    #[arg(short = 't', long = "throughput")]
    throughput: bool,

    /// Run latency benchmarks (loaded when more than one worker thread)
    #[arg(short = 'l', long = "latency")]
    latency: bool,

    /// Working set size per worker thread, in KiB (multiple of 4)
    #[arg(short = 'w', long = "working_set_size", value_name = "KiB")]
    working_set_size: Option<usize>,

    /// Number of worker threads
    #[arg(short = 'j', long = "num_worker_threads", value_name = "N")]
    num_worker_threads: Option<u32>,

    /// Chunk size in bits (32, 64, 128, 256); repeatable
    #[arg(short = 'c', long = "chunk_size", value_name = "BITS")]
    chunk_size: Vec<u32>,

    /// Stride in chunks (1, -1, 2, -2, 4, -4, 8, -8, 16, -16); repeatable
    #[arg(
        short = 's',
        long = "stride_size",
        value_name = "CHUNKS",
        allow_negative_numbers = true
    )]
    stride_size: Vec<i64>,

    /// Use the random access pattern
    #[arg(short = 'r')]
    random_access: bool,

    /// Use the sequential access pattern
    #[arg(short = 'S')]
    sequential_access: bool,

    /// Use memory reads
    #[arg(short = 'R')]
    reads: bool,

    /// Use memory writes
    #[arg(short = 'W')]
    writes: bool,

    /// Disable NUMA awareness (single UMA arena)
    #[arg(short = 'u')]
    no_numa: bool,

    /// Allocate arenas with large pages (requires -u)
    #[arg(short = 'L')]
    large_pages: bool,

    /// Iterations per benchmark
    #[arg(short = 'n', long = "iterations", value_name = "N")]
    iterations: Option<u32>,

    /// Starting test index
    #[arg(short = 'i', long = "base_test_index", value_name = "N")]
    base_test_index: Option<u32>,

    /// Write results to this CSV file
    #[arg(short = 'f', long = "output_file", value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// Verbose progress output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

/// Fold the flags into a validated run configuration. Explicit flags in a
/// group replace that group's defaults; untouched groups keep them.
fn build_config(cli: &Cli) -> Result<RunConfig, String> {
    let mut config = RunConfig::default();

    if cli.throughput || cli.latency {
        config.run_throughput = cli.throughput;
        config.run_latency = cli.latency;
    }

    if let Some(kib) = cli.working_set_size {
        config.working_set_size_per_thread = kib * 1024;
    }
    if let Some(threads) = cli.num_worker_threads {
        config.num_worker_threads = threads;
    }

    if !cli.chunk_size.is_empty() {
        let mut chunks = Vec::new();
        for &bits in &cli.chunk_size {
            match ChunkSize::from_bits(bits) {
                Some(chunk) => {
                    if !chunks.contains(&chunk) {
                        chunks.push(chunk);
                    }
                }
                None => {
                    return Err(format!(
                        "invalid chunk size {bits}; chunk sizes can be 32, 64, 128, or 256 bits"
                    ));
                }
            }
        }
        config.chunk_sizes = chunks;
    }

    if !cli.stride_size.is_empty() {
        let mut strides = Vec::new();
        for &stride in &cli.stride_size {
            if !strides.contains(&stride) {
                strides.push(stride);
            }
        }
        config.strides = strides;
    }

    if cli.random_access || cli.sequential_access {
        config.use_random_access = cli.random_access;
        config.use_sequential_access = cli.sequential_access;
    }
    if cli.reads || cli.writes {
        config.use_reads = cli.reads;
        config.use_writes = cli.writes;
    }

    if cli.no_numa {
        config.numa_enabled = false;
    }
    if cli.large_pages {
        config.use_large_pages = true;
    }

    if let Some(iterations) = cli.iterations {
        config.iterations = iterations;
    }
    if let Some(index) = cli.base_test_index {
        config.base_test_index = index;
    }
    config.output_file = cli.output_file.clone();
    config.verbose = cli.verbose;

    Ok(config)
}

fn print_welcome(topology: &SystemTopology, config: &RunConfig) {
    println!("memprobe v{}", memprobe_core::VERSION);
    println!(
        "NUMA nodes: {} | packages: {} | physical cores: {} | logical CPUs: {}",
        topology.num_numa_nodes,
        topology.num_physical_packages,
        topology.num_physical_cores,
        topology.num_logical_cpus
    );
    println!(
        "page size: {} B | large page size: {} B",
        topology.page_size, topology.large_page_size
    );
    let t = timer();
    println!(
        "timer: {} ticks/ms ({:.4} ns/tick)",
        t.ticks_per_ms(),
        t.ns_per_tick()
    );
    println!(
        "working set per thread: {} KiB | threads: {} | iterations: {}",
        config.working_set_size_per_thread / 1024,
        config.num_worker_threads,
        config.iterations
    );
    println!();
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .init();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ERROR: {err}");
            std::process::exit(1);
        }
    };

    let mut suite = match BenchmarkSuite::new(config) {
        Ok(suite) => suite,
        Err(err) => {
            eprintln!("ERROR: {err}");
            std::process::exit(1);
        }
    };

    if suite.config().verbose {
        print_welcome(suite.topology(), suite.config());
    }

    if let Err(err) = suite.run_all() {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("memprobe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_flags_selects_defaults() {
        let config = build_config(&parse(&[])).unwrap();
        assert!(config.run_throughput);
        assert!(config.run_latency);
        assert_eq!(config.chunk_sizes, vec![ChunkSize::Bits64]);
        assert_eq!(config.strides, vec![1]);
        assert!(config.use_sequential_access);
        assert!(!config.use_random_access);
        assert!(config.use_reads);
        assert!(config.use_writes);
        assert!(config.numa_enabled);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.base_test_index, 1);
    }

    #[test]
    fn explicit_mode_flags_override_the_default_pair() {
        let config = build_config(&parse(&["-t"])).unwrap();
        assert!(config.run_throughput);
        assert!(!config.run_latency);

        let config = build_config(&parse(&["-l"])).unwrap();
        assert!(!config.run_throughput);
        assert!(config.run_latency);
    }

    #[test]
    fn repeatable_chunks_and_strides() {
        let cli = parse(&["-c", "64", "-c", "256", "-s", "1", "-s", "-4"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(
            config.chunk_sizes,
            vec![ChunkSize::Bits64, ChunkSize::Bits256]
        );
        assert_eq!(config.strides, vec![1, -4]);
    }

    #[test]
    fn invalid_chunk_is_a_config_error() {
        assert!(build_config(&parse(&["-c", "48"])).is_err());
    }

    #[test]
    fn working_set_is_given_in_kib() {
        let config = build_config(&parse(&["-w", "64"])).unwrap();
        assert_eq!(config.working_set_size_per_thread, 64 * 1024);
    }

    #[test]
    fn pattern_flags_override_defaults() {
        let config = build_config(&parse(&["-r"])).unwrap();
        assert!(config.use_random_access);
        assert!(!config.use_sequential_access);

        let config = build_config(&parse(&["-r", "-S"])).unwrap();
        assert!(config.use_random_access);
        assert!(config.use_sequential_access);
    }

    #[test]
    fn rw_flags_override_defaults() {
        let config = build_config(&parse(&["-W"])).unwrap();
        assert!(!config.use_reads);
        assert!(config.use_writes);
    }

    #[test]
    fn numa_and_large_page_flags() {
        let config = build_config(&parse(&["-u", "-L"])).unwrap();
        assert!(!config.numa_enabled);
        assert!(config.use_large_pages);
    }

    #[test]
    fn output_file_and_indexing() {
        let cli = parse(&["-f", "out.csv", "-n", "5", "-i", "100", "-j", "2"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.output_file, Some(PathBuf::from("out.csv")));
        assert_eq!(config.iterations, 5);
        assert_eq!(config.base_test_index, 100);
        assert_eq!(config.num_worker_threads, 2);
    }
}
