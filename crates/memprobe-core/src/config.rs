//! Validated run configuration.
//!
//! The CLI populates a [`RunConfig`] from flags; [`RunConfig::validate`]
//! rejects nonsense combinations before any memory is allocated, so a bad
//! invocation exits cleanly with a message instead of half-running.

use std::path::PathBuf;

use crate::kernels::{ChunkSize, SUPPORTED_STRIDES};
use crate::topology::SystemTopology;

/// Everything one run needs to know. Defaults mirror an everyday invocation:
/// both benchmark families, 64-bit chunks, forward-sequential stride 1, reads
/// and writes, NUMA on, one iteration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_throughput: bool,
    pub run_latency: bool,
    /// Per-thread arena size in bytes. Must be a positive multiple of 4 KiB.
    pub working_set_size_per_thread: usize,
    pub num_worker_threads: u32,
    pub chunk_sizes: Vec<ChunkSize>,
    /// Strides in chunks, signed for direction.
    pub strides: Vec<i64>,
    pub use_random_access: bool,
    pub use_sequential_access: bool,
    pub use_reads: bool,
    pub use_writes: bool,
    pub numa_enabled: bool,
    pub use_large_pages: bool,
    pub iterations: u32,
    pub base_test_index: u32,
    pub output_file: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_throughput: true,
            run_latency: true,
            working_set_size_per_thread: 4 * 1024,
            num_worker_threads: 1,
            chunk_sizes: vec![ChunkSize::Bits64],
            strides: vec![1],
            use_random_access: false,
            use_sequential_access: true,
            use_reads: true,
            use_writes: true,
            numa_enabled: true,
            use_large_pages: false,
            iterations: 1,
            base_test_index: 1,
            output_file: None,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Check the configuration against itself and the machine. Returns the
    /// first problem found.
    pub fn validate(&self, topology: &SystemTopology) -> Result<(), String> {
        if !self.run_throughput && !self.run_latency {
            return Err("at least one benchmark type must be selected".to_string());
        }

        if self.working_set_size_per_thread == 0
            || self.working_set_size_per_thread % (4 * 1024) != 0
        {
            return Err(
                "working set size must be specified in KiB and be a multiple of 4 KiB".to_string(),
            );
        }

        if self.num_worker_threads == 0 {
            return Err("at least one worker thread is required".to_string());
        }
        if self.num_worker_threads > topology.num_logical_cpus {
            return Err(format!(
                "number of worker threads may not exceed the number of logical CPUs ({})",
                topology.num_logical_cpus
            ));
        }

        if self.iterations == 0 {
            return Err("iterations must be positive".to_string());
        }

        if self.use_large_pages && self.numa_enabled {
            return Err(
                "large pages are not supported alongside NUMA; disable NUMA explicitly (-u) \
                 to use large pages"
                    .to_string(),
            );
        }

        if self.chunk_sizes.is_empty() {
            return Err("at least one chunk size must be selected".to_string());
        }

        if self.run_throughput {
            if !self.use_random_access && !self.use_sequential_access {
                return Err("no access pattern was specified".to_string());
            }
            if !self.use_reads && !self.use_writes {
                return Err(
                    "throughput benchmark was selected, but no read/write mode was specified"
                        .to_string(),
                );
            }
            if self.use_sequential_access {
                if self.strides.is_empty() {
                    return Err("sequential access requires at least one stride".to_string());
                }
                for &stride in &self.strides {
                    if !SUPPORTED_STRIDES.contains(&stride) {
                        return Err(format!(
                            "invalid stride size {stride}; stride sizes can be \
                             1, -1, 2, -2, 4, -4, 8, -8, 16, or -16"
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Total arena bytes needed per memory node.
    pub fn bytes_per_node(&self) -> usize {
        self.working_set_size_per_thread * self.num_worker_threads as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo() -> SystemTopology {
        SystemTopology::probe()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate(&topo()).is_ok());
    }

    #[test]
    fn rejects_no_benchmark_type() {
        let config = RunConfig {
            run_throughput: false,
            run_latency: false,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_err());
    }

    #[test]
    fn rejects_unaligned_working_set() {
        for bad in [0usize, 1000, 4095, 4 * 1024 + 1] {
            let config = RunConfig {
                working_set_size_per_thread: bad,
                ..Default::default()
            };
            assert!(config.validate(&topo()).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn rejects_too_many_threads() {
        let topology = topo();
        let config = RunConfig {
            num_worker_threads: topology.num_logical_cpus + 1,
            ..Default::default()
        };
        assert!(config.validate(&topology).is_err());
    }

    #[test]
    fn rejects_zero_iterations() {
        let config = RunConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_err());
    }

    #[test]
    fn large_pages_require_uma() {
        let config = RunConfig {
            use_large_pages: true,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_err());

        let config = RunConfig {
            use_large_pages: true,
            numa_enabled: false,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_ok());
    }

    #[test]
    fn rejects_invalid_strides() {
        for bad in [0i64, 3, -5, 32] {
            let config = RunConfig {
                strides: vec![bad],
                ..Default::default()
            };
            assert!(config.validate(&topo()).is_err(), "accepted stride {bad}");
        }
    }

    #[test]
    fn throughput_needs_a_pattern_and_a_mix() {
        let config = RunConfig {
            use_random_access: false,
            use_sequential_access: false,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_err());

        let config = RunConfig {
            use_reads: false,
            use_writes: false,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_err());

        // Latency-only runs do not need either.
        let config = RunConfig {
            run_throughput: false,
            use_random_access: false,
            use_sequential_access: false,
            use_reads: false,
            use_writes: false,
            ..Default::default()
        };
        assert!(config.validate(&topo()).is_ok());
    }

    #[test]
    fn bytes_per_node_scales_with_threads() {
        let config = RunConfig {
            working_set_size_per_thread: 8 * 1024,
            num_worker_threads: 4,
            ..Default::default()
        };
        assert_eq!(config.bytes_per_node(), 32 * 1024);
    }
}
