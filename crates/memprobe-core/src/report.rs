//! CSV results emission.
//!
//! One header row when the file opens, one row per finished benchmark. Only
//! the main thread writes here. Values that have no meaning for a row (for
//! example stride in a latency row) render as `N/A`; enum values outside the
//! known sets render as `UNKNOWN`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::bench::{BenchmarkOutcome, BenchmarkParams, MetricUnits};
use crate::kernels::{ChunkSize, Pattern, RwMode};

/// Open results file plus the number of power columns it was created with.
pub struct ResultsFile {
    out: BufWriter<File>,
    num_sockets: usize,
}

impl ResultsFile {
    /// Create the file and write the header. `socket_names` are the power
    /// reader names, one per socket, in socket order.
    pub fn create(path: &Path, socket_names: &[String]) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);

        write!(
            out,
            "Test Name,Iterations,Working Set Size Per Thread (KB),NUMA Memory Node,\
             NUMA CPU Node,Access Pattern,Read/Write Mix,Chunk Size (bits),\
             Stride Size (chunks),Average Test Result,Test Result Units,"
        )?;
        for name in socket_names {
            write!(out, "{name} Average Power (W),{name} Peak Power (W),")?;
        }
        writeln!(out)?;
        out.flush()?;

        Ok(Self {
            out,
            num_sockets: socket_names.len(),
        })
    }

    /// Append one throughput row.
    pub fn append_throughput_row(
        &mut self,
        params: &BenchmarkParams,
        outcome: &BenchmarkOutcome,
        wss_per_thread_bytes: usize,
    ) -> io::Result<()> {
        write!(
            self.out,
            "{},{},{},{},{},{},{},{},{},{},{},",
            params.name,
            params.iterations,
            wss_per_thread_bytes / 1024,
            params.mem_node,
            params.cpu_node,
            pattern_label(params.pattern),
            rw_label(params.rw),
            chunk_label(params.chunk),
            params.stride,
            outcome.avg_metric,
            MetricUnits::MegabytesPerSecond,
        )?;
        self.append_power_columns(outcome)
    }

    /// Append one latency row. Latency rows always describe the 64-bit
    /// pointer chase; stride does not apply.
    pub fn append_latency_row(
        &mut self,
        params: &BenchmarkParams,
        outcome: &BenchmarkOutcome,
        wss_per_thread_bytes: usize,
    ) -> io::Result<()> {
        write!(
            self.out,
            "{},{},{},{},{},RANDOM POINTER CHASING,READ ONLY,64,N/A,{},{},",
            params.name,
            params.iterations,
            wss_per_thread_bytes / 1024,
            params.mem_node,
            params.cpu_node,
            outcome.avg_metric,
            MetricUnits::NanosecondsPerAccess,
        )?;
        self.append_power_columns(outcome)
    }

    fn append_power_columns(&mut self, outcome: &BenchmarkOutcome) -> io::Result<()> {
        for socket in 0..self.num_sockets {
            let avg = outcome.avg_power.get(socket).copied().unwrap_or(0.0);
            let peak = outcome.peak_power.get(socket).copied().unwrap_or(0.0);
            write!(self.out, "{avg},{peak},")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

fn pattern_label(pattern: Pattern) -> &'static str {
    match pattern {
        Pattern::Sequential => "SEQUENTIAL",
        Pattern::Random => "RANDOM",
    }
}

fn rw_label(rw: RwMode) -> &'static str {
    match rw {
        RwMode::Read => "READ",
        RwMode::Write => "WRITE",
    }
}

fn chunk_label(chunk: ChunkSize) -> &'static str {
    match chunk.bits() {
        32 => "32",
        64 => "64",
        128 => "128",
        256 => "256",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BenchmarkParams {
        BenchmarkParams {
            name: "Test #1 (Throughput)".to_string(),
            chunk: ChunkSize::Bits64,
            pattern: Pattern::Sequential,
            rw: RwMode::Read,
            stride: -4,
            mem_node: 0,
            cpu_node: 0,
            num_worker_threads: 1,
            iterations: 3,
        }
    }

    fn outcome() -> BenchmarkOutcome {
        BenchmarkOutcome {
            metric_on_iter: vec![100.0, 110.0, 120.0],
            avg_metric: 110.0,
            avg_power: vec![3.5],
            peak_power: vec![4.25],
            load_metric: None,
            warning: false,
            has_run: true,
        }
    }

    #[test]
    fn header_matches_the_published_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let _file =
            ResultsFile::create(&path, &["Socket 0 DRAM".to_string()]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert!(header.starts_with(
            "Test Name,Iterations,Working Set Size Per Thread (KB),NUMA Memory Node,\
             NUMA CPU Node,Access Pattern,Read/Write Mix,Chunk Size (bits),\
             Stride Size (chunks),Average Test Result,Test Result Units,"
        ));
        assert!(header.contains("Socket 0 DRAM Average Power (W)"));
        assert!(header.contains("Socket 0 DRAM Peak Power (W)"));
    }

    #[test]
    fn throughput_row_carries_config_and_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut file =
            ResultsFile::create(&path, &["Socket 0 DRAM".to_string()]).unwrap();
        file.append_throughput_row(&params(), &outcome(), 64 * 1024)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "Test #1 (Throughput),3,64,0,0,SEQUENTIAL,READ,64,-4,110,MB/s,3.5,4.25,"
        );
    }

    #[test]
    fn latency_row_uses_na_stride_and_ns_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut file =
            ResultsFile::create(&path, &["Socket 0 DRAM".to_string()]).unwrap();
        let mut p = params();
        p.name = "Test #2 (Latency)".to_string();
        p.pattern = Pattern::Random;
        file.append_latency_row(&p, &outcome(), 64 * 1024).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert!(row.contains("RANDOM POINTER CHASING,READ ONLY,64,N/A,"));
        assert!(row.contains("ns/access"));
    }

    #[test]
    fn rows_without_power_readers_have_no_power_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut file = ResultsFile::create(&path, &[]).unwrap();
        file.append_throughput_row(&params(), &outcome(), 4096)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let row = contents.lines().nth(1).unwrap();
        assert!(row.ends_with("MB/s,"));
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let result = ResultsFile::create(Path::new("/nonexistent-dir/results.csv"), &[]);
        assert!(result.is_err());
    }
}
