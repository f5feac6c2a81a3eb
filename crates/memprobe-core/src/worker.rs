//! Benchmark workers: one thread, one kernel, one slice of an arena.
//!
//! A worker pins itself to its CPU, boosts its scheduling priority, primes
//! its slice, times the real kernel, times the matching dummy for the same
//! pass count, and publishes a single record under its lock. Pinning and
//! priority failures are warnings, not errors. Workers are single-use: the
//! driver joins the thread and then reads the record.
//!
//! Only two threads ever touch a worker: its own thread (one write at the
//! end, under the lock) and the driver (one read, after join).

use std::ptr;
use std::sync::Mutex;

use crate::affinity;
use crate::kernels::{RandomKernelPair, SequentialKernelPair, sequential};
use crate::timer::timer;
use crate::{
    BENCHMARK_DURATION_MS, LATENCY_BENCHMARK_UNROLL_LENGTH, MIN_ELAPSED_TICKS,
    THROUGHPUT_BENCHMARK_BYTES_PER_PASS,
};

/// Kernel invocations per timed block in throughput workers. Reading the
/// timer around a block instead of every call keeps the timer itself out of
/// the measurement.
pub const PASSES_PER_TIMED_BLOCK: u64 = 1024;

/// Chase-kernel invocations per timed block in latency workers.
pub const CHASES_PER_TIMED_BLOCK: u64 = 256;

/// How a worker decides when it is done.
#[derive(Debug, Clone, Copy)]
pub enum TimingMode {
    /// Run until at least this many ticks have been accumulated.
    TimeBased { target_ticks: u64 },
    /// Run exactly this many passes, one timer read pair around the whole
    /// batch.
    SizeBased { passes: u64 },
}

impl TimingMode {
    /// The default operating mode: run for the configured benchmark duration.
    pub fn for_benchmark_duration() -> Self {
        TimingMode::TimeBased {
            target_ticks: timer().ticks_per_ms() * BENCHMARK_DURATION_MS,
        }
    }
}

/// Everything a worker publishes when it finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerRecord {
    pub passes: u64,
    pub bytes_per_pass: u64,
    pub elapsed_ticks: u64,
    pub elapsed_dummy_ticks: u64,
    pub adjusted_ticks: u64,
    pub warning: bool,
    pub completed: bool,
}

/// Subtract loop overhead and apply the sanity thresholds. The result is
/// kept either way; `warning` flags it for human review.
fn finish_record(
    passes: u64,
    bytes_per_pass: u64,
    elapsed_ticks: u64,
    elapsed_dummy_ticks: u64,
) -> WorkerRecord {
    let adjusted_ticks = elapsed_ticks.saturating_sub(elapsed_dummy_ticks);
    let warning = elapsed_dummy_ticks >= elapsed_ticks
        || elapsed_ticks < MIN_ELAPSED_TICKS
        || (adjusted_ticks as f64) < 0.5 * elapsed_ticks as f64;
    WorkerRecord {
        passes,
        bytes_per_pass,
        elapsed_ticks,
        elapsed_dummy_ticks,
        adjusted_ticks,
        warning,
        completed: true,
    }
}

/// Raw slice pointer that may cross into a worker thread. The driver hands
/// each worker a disjoint slice, which is what makes this sound.
#[derive(Debug, Clone, Copy)]
pub struct SendPtr(pub *mut u8);

// SAFETY: see above; slices are disjoint and outlive the worker threads.
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

/// The kernel family a throughput-style worker runs.
#[derive(Clone, Copy)]
pub enum WorkerKernel {
    Sequential(SequentialKernelPair),
    Random(RandomKernelPair),
}

fn pin_and_boost(cpu_id: Option<u32>) -> (bool, Option<i32>) {
    let pinned = match cpu_id {
        Some(cpu) => {
            let ok = affinity::pin_to_cpu(cpu);
            if !ok {
                log::warn!("failed to pin worker thread to CPU {cpu}; results may be noisy");
            }
            ok
        }
        None => false,
    };
    let previous_nice = affinity::boost_priority();
    if previous_nice.is_none() {
        log::warn!("failed to boost worker scheduling priority (try running with privileges)");
    }
    (pinned, previous_nice)
}

fn unpin_and_restore(pinned: bool, previous_nice: Option<i32>) {
    if pinned {
        affinity::unpin();
    }
    if let Some(prev) = previous_nice {
        affinity::restore_priority(prev);
    }
}

/// A worker that measures aggregate access throughput over its slice, or
/// generates background load for the loaded-latency benchmark.
pub struct ThroughputWorker {
    mem: SendPtr,
    len: usize,
    kernel: WorkerKernel,
    cpu_id: Option<u32>,
    mode: TimingMode,
    record: Mutex<WorkerRecord>,
}

impl ThroughputWorker {
    pub fn new(
        mem: SendPtr,
        len: usize,
        kernel: WorkerKernel,
        cpu_id: Option<u32>,
        mode: TimingMode,
    ) -> Self {
        Self {
            mem,
            len,
            kernel,
            cpu_id,
            mode,
            record: Mutex::new(WorkerRecord::default()),
        }
    }

    /// The worker protocol. Runs on the worker's own thread, exactly once.
    pub fn run(&self) {
        let (pinned, previous_nice) = pin_and_boost(self.cpu_id);

        let mem = self.mem.0;
        let len = self.len;

        // Prime: fault every page in and warm the caches. Random kernels
        // chase a prebuilt pointer graph, so their slice must only be primed
        // with reads.
        // SAFETY: [mem, mem + len) is this worker's exclusive slice.
        unsafe {
            match self.kernel {
                WorkerKernel::Sequential(pair) => {
                    sequential::forw_sequential_write_word64(mem, mem.add(len));
                    for _ in 0..4 {
                        sequential::forw_sequential_read_word64(mem, mem.add(len));
                    }
                    let window = THROUGHPUT_BENCHMARK_BYTES_PER_PASS.min(len);
                    for _ in 0..4 {
                        (pair.kernel)(mem, mem.add(window));
                    }
                }
                WorkerKernel::Random(pair) => {
                    for _ in 0..4 {
                        sequential::forw_sequential_read_word32(mem, mem.add(len));
                    }
                    let mut next = mem as *mut usize;
                    (pair.kernel)(next, &mut next, len);
                }
            }
        }

        let record = match self.kernel {
            WorkerKernel::Sequential(pair) => self.run_sequential(pair),
            WorkerKernel::Random(pair) => self.run_random(pair),
        };

        unpin_and_restore(pinned, previous_nice);

        let mut slot = self.record.lock().unwrap();
        *slot = record;
    }

    fn run_sequential(&self, pair: SequentialKernelPair) -> WorkerRecord {
        let t = timer();
        let mem = self.mem.0;
        let len = self.len;

        match self.mode {
            TimingMode::TimeBased { target_ticks } => {
                let bytes_per_pass = THROUGHPUT_BENCHMARK_BYTES_PER_PASS.min(len);
                let mut elapsed: u64 = 0;
                let mut passes: u64 = 0;

                // Real kernel: slide a bytes-per-pass window across the
                // slice, wrapping modulo its length.
                let mut offset: usize = 0;
                while elapsed < target_ticks {
                    let start = t.start();
                    for _ in 0..PASSES_PER_TIMED_BLOCK {
                        // SAFETY: the window stays inside the slice (plus the
                        // arena's tail slack for reverse kernels).
                        unsafe {
                            (pair.kernel)(mem.add(offset), mem.add(offset + bytes_per_pass));
                        }
                        offset = (offset + bytes_per_pass) % len;
                    }
                    let stop = t.stop();
                    elapsed += stop - start;
                    passes += PASSES_PER_TIMED_BLOCK;
                }

                // Dummy kernel: identical structure, same pass count.
                let mut elapsed_dummy: u64 = 0;
                let mut done: u64 = 0;
                offset = 0;
                while done < passes {
                    let start = t.start();
                    for _ in 0..PASSES_PER_TIMED_BLOCK {
                        // SAFETY: as above.
                        unsafe {
                            (pair.dummy)(mem.add(offset), mem.add(offset + bytes_per_pass));
                        }
                        offset = (offset + bytes_per_pass) % len;
                    }
                    let stop = t.stop();
                    elapsed_dummy += stop - start;
                    done += PASSES_PER_TIMED_BLOCK;
                }

                finish_record(passes, bytes_per_pass as u64, elapsed, elapsed_dummy)
            }
            TimingMode::SizeBased { passes } => {
                // One pass is a full traversal of the slice.
                let start = t.start();
                for _ in 0..passes {
                    // SAFETY: [mem, mem + len) is this worker's slice.
                    unsafe {
                        (pair.kernel)(mem, mem.add(len));
                    }
                }
                let elapsed = t.stop() - start;

                let start = t.start();
                for _ in 0..passes {
                    // SAFETY: as above.
                    unsafe {
                        (pair.dummy)(mem, mem.add(len));
                    }
                }
                let elapsed_dummy = t.stop() - start;

                finish_record(passes, len as u64, elapsed, elapsed_dummy)
            }
        }
    }

    fn run_random(&self, pair: RandomKernelPair) -> WorkerRecord {
        let t = timer();
        let mem = self.mem.0;
        let len = self.len;

        match self.mode {
            TimingMode::TimeBased { target_ticks } => {
                let bytes_per_pass = THROUGHPUT_BENCHMARK_BYTES_PER_PASS.min(len);
                let mut elapsed: u64 = 0;
                let mut passes: u64 = 0;
                let mut next = mem as *mut usize;

                while elapsed < target_ticks {
                    let start = t.start();
                    for _ in 0..PASSES_PER_TIMED_BLOCK {
                        // SAFETY: the chase follows the permutation built
                        // over this slice and never leaves it.
                        unsafe {
                            (pair.kernel)(next, &mut next, len);
                        }
                    }
                    let stop = t.stop();
                    elapsed += stop - start;
                    passes += PASSES_PER_TIMED_BLOCK;
                }

                let mut elapsed_dummy: u64 = 0;
                let mut done: u64 = 0;
                let mut scratch: *mut usize = ptr::null_mut();
                while done < passes {
                    let start = t.start();
                    for _ in 0..PASSES_PER_TIMED_BLOCK {
                        // SAFETY: dummies ignore their arguments.
                        unsafe {
                            (pair.dummy)(ptr::null_mut(), &mut scratch, len);
                        }
                    }
                    let stop = t.stop();
                    elapsed_dummy += stop - start;
                    done += PASSES_PER_TIMED_BLOCK;
                }

                finish_record(passes, bytes_per_pass as u64, elapsed, elapsed_dummy)
            }
            TimingMode::SizeBased { passes } => {
                let calls_per_pass =
                    (len as u64 / THROUGHPUT_BENCHMARK_BYTES_PER_PASS as u64).max(1);
                let mut next = mem as *mut usize;

                let start = t.start();
                for _ in 0..passes * calls_per_pass {
                    // SAFETY: as above.
                    unsafe {
                        (pair.kernel)(next, &mut next, len);
                    }
                }
                let elapsed = t.stop() - start;

                let mut scratch: *mut usize = ptr::null_mut();
                let start = t.start();
                for _ in 0..passes * calls_per_pass {
                    // SAFETY: dummies ignore their arguments.
                    unsafe {
                        (pair.dummy)(ptr::null_mut(), &mut scratch, len);
                    }
                }
                let elapsed_dummy = t.stop() - start;

                finish_record(passes, len as u64, elapsed, elapsed_dummy)
            }
        }
    }

    /// The published record. Meaningful only after the worker thread joined.
    pub fn record(&self) -> WorkerRecord {
        *self.record.lock().unwrap()
    }
}

/// A worker that measures per-access latency with a dependent pointer chase.
pub struct LatencyWorker {
    mem: SendPtr,
    len: usize,
    kernel: RandomKernelPair,
    cpu_id: Option<u32>,
    mode: TimingMode,
    record: Mutex<WorkerRecord>,
}

impl LatencyWorker {
    pub fn new(
        mem: SendPtr,
        len: usize,
        kernel: RandomKernelPair,
        cpu_id: Option<u32>,
        mode: TimingMode,
    ) -> Self {
        Self {
            mem,
            len,
            kernel,
            cpu_id,
            mode,
            record: Mutex::new(WorkerRecord::default()),
        }
    }

    /// Accesses per pass for the latency metric: each kernel call follows
    /// this many pointers.
    pub fn accesses_per_pass(&self) -> u64 {
        match self.mode {
            TimingMode::TimeBased { .. } => LATENCY_BENCHMARK_UNROLL_LENGTH,
            TimingMode::SizeBased { .. } => (self.len / 8) as u64,
        }
    }

    pub fn run(&self) {
        let (pinned, previous_nice) = pin_and_boost(self.cpu_id);

        let t = timer();
        let mem = self.mem.0;
        let len = self.len;

        // Prime with reads only; writes would destroy the pointer graph.
        // SAFETY: [mem, mem + len) is this worker's exclusive slice.
        unsafe {
            for _ in 0..4 {
                sequential::forw_sequential_read_word32(mem, mem.add(len));
            }
        }

        let record = match self.mode {
            TimingMode::TimeBased { target_ticks } => {
                let mut elapsed: u64 = 0;
                let mut passes: u64 = 0;
                let mut next = mem as *mut usize;

                while elapsed < target_ticks {
                    let start = t.start();
                    for _ in 0..CHASES_PER_TIMED_BLOCK {
                        // SAFETY: the chase follows the permutation built
                        // over this slice.
                        unsafe {
                            (self.kernel.kernel)(next, &mut next, len);
                        }
                    }
                    let stop = t.stop();
                    elapsed += stop - start;
                    passes += CHASES_PER_TIMED_BLOCK;
                }

                let mut elapsed_dummy: u64 = 0;
                let mut done: u64 = 0;
                let mut scratch: *mut usize = ptr::null_mut();
                while done < passes {
                    let start = t.start();
                    for _ in 0..CHASES_PER_TIMED_BLOCK {
                        // SAFETY: dummies ignore their arguments.
                        unsafe {
                            (self.kernel.dummy)(ptr::null_mut(), &mut scratch, len);
                        }
                    }
                    let stop = t.stop();
                    elapsed_dummy += stop - start;
                    done += CHASES_PER_TIMED_BLOCK;
                }

                finish_record(
                    passes,
                    LATENCY_BENCHMARK_UNROLL_LENGTH * 8,
                    elapsed,
                    elapsed_dummy,
                )
            }
            TimingMode::SizeBased { passes } => {
                let calls_per_pass =
                    (len as u64 / (LATENCY_BENCHMARK_UNROLL_LENGTH * 8)).max(1);
                let mut next = mem as *mut usize;

                let start = t.start();
                for _ in 0..passes * calls_per_pass {
                    // SAFETY: as above.
                    unsafe {
                        (self.kernel.kernel)(next, &mut next, len);
                    }
                }
                let elapsed = t.stop() - start;

                let mut scratch: *mut usize = ptr::null_mut();
                let start = t.start();
                for _ in 0..passes * calls_per_pass {
                    // SAFETY: dummies ignore their arguments.
                    unsafe {
                        (self.kernel.dummy)(ptr::null_mut(), &mut scratch, len);
                    }
                }
                let elapsed_dummy = t.stop() - start;

                finish_record(passes, len as u64, elapsed, elapsed_dummy)
            }
        };

        unpin_and_restore(pinned, previous_nice);

        let mut slot = self.record.lock().unwrap();
        *slot = record;
    }

    pub fn record(&self) -> WorkerRecord {
        *self.record.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_random_pointer_permutation;
    use crate::kernels::{ChunkSize, RwMode, resolve_random, resolve_sequential};
    use std::sync::Arc;

    #[repr(C, align(4096))]
    struct Region {
        bytes: [u8; 2 * 4096 + 64],
    }

    fn region() -> Box<Region> {
        Box::new(Region {
            bytes: [0; 2 * 4096 + 64],
        })
    }

    #[test]
    fn warning_rules() {
        // Dummy outran the real kernel.
        let r = finish_record(1, 4096, 100_000, 100_000);
        assert!(r.warning);
        assert_eq!(r.adjusted_ticks, 0);

        // Elapsed under the minimum-ticks threshold.
        let r = finish_record(1, 4096, MIN_ELAPSED_TICKS - 1, 1);
        assert!(r.warning);

        // Adjustment ate more than half the elapsed time.
        let r = finish_record(1, 4096, 100_000, 60_000);
        assert!(r.warning);

        // Healthy measurement.
        let r = finish_record(1, 4096, 100_000, 10_000);
        assert!(!r.warning);
        assert_eq!(r.adjusted_ticks, 90_000);
        assert!(r.completed);
    }

    #[test]
    fn sequential_worker_size_based_completes() {
        let mut buf = region();
        let mem = SendPtr(buf.bytes.as_mut_ptr());
        let pair = resolve_sequential(RwMode::Read, ChunkSize::Bits64, 1).unwrap();
        let worker = Arc::new(ThroughputWorker::new(
            mem,
            2 * 4096,
            WorkerKernel::Sequential(pair),
            None,
            TimingMode::SizeBased { passes: 3 },
        ));

        let w = worker.clone();
        std::thread::spawn(move || w.run()).join().unwrap();

        let record = worker.record();
        assert!(record.completed);
        assert_eq!(record.passes, 3);
        assert_eq!(record.bytes_per_pass, 2 * 4096);
    }

    #[test]
    fn random_worker_size_based_completes() {
        let mut buf = region();
        let mem = SendPtr(buf.bytes.as_mut_ptr());
        assert!(build_random_pointer_permutation(
            mem.0,
            2 * 4096,
            ChunkSize::Bits64,
            Some(2)
        ));
        let pair = resolve_random(RwMode::Read, ChunkSize::Bits64).unwrap();
        let worker = Arc::new(ThroughputWorker::new(
            mem,
            2 * 4096,
            WorkerKernel::Random(pair),
            None,
            TimingMode::SizeBased { passes: 2 },
        ));

        let w = worker.clone();
        std::thread::spawn(move || w.run()).join().unwrap();

        let record = worker.record();
        assert!(record.completed);
        assert_eq!(record.passes, 2);
    }

    #[test]
    fn latency_worker_size_based_completes() {
        let mut buf = region();
        let mem = SendPtr(buf.bytes.as_mut_ptr());
        assert!(build_random_pointer_permutation(
            mem.0,
            2 * 4096,
            ChunkSize::Bits64,
            Some(4)
        ));
        let pair = resolve_random(RwMode::Read, ChunkSize::Bits64).unwrap();
        let worker = Arc::new(LatencyWorker::new(
            mem,
            2 * 4096,
            pair,
            None,
            TimingMode::SizeBased { passes: 2 },
        ));
        assert_eq!(worker.accesses_per_pass(), 2 * 4096 / 8);

        let w = worker.clone();
        std::thread::spawn(move || w.run()).join().unwrap();

        let record = worker.record();
        assert!(record.completed);
        assert_eq!(record.passes, 2);
    }

    #[test]
    fn record_starts_incomplete() {
        let mut buf = region();
        let mem = SendPtr(buf.bytes.as_mut_ptr());
        let pair = resolve_sequential(RwMode::Read, ChunkSize::Bits64, 1).unwrap();
        let worker = ThroughputWorker::new(
            mem,
            4096,
            WorkerKernel::Sequential(pair),
            None,
            TimingMode::SizeBased { passes: 1 },
        );
        assert!(!worker.record().completed);
    }
}
