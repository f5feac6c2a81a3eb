//! The benchmark kernel catalog: hand-unrolled memory access routines.
//!
//! Every supported `(read/write, chunk, stride, direction)` sequential
//! combination and `(read/write, chunk)` random combination comes as a pair:
//! the real kernel and a dummy that replays the identical control flow
//! (loop bounds, pointer arithmetic, wrap, unroll factor) without the memory
//! access itself. Workers time both and subtract, isolating the access cost
//! from loop overhead.
//!
//! Structural rules:
//! - Each loop iteration makes 4096 bytes of address progress, so the unroll
//!   factor is `4096 / (chunk_bytes * |stride|)`.
//! - Cursors are accessed through volatile reads/writes so no load or store
//!   is ever elided.
//! - Strided kernels wrap modulo the region length at iteration granularity,
//!   never mid-iteration.
//! - 128/256-bit kernels exist only on x86_64 and are resolved only when the
//!   CPU reports AVX; other configurations are unsupported and skipped.

#[macro_use]
mod unroll;

pub mod delays;
pub mod random;
pub mod sequential;

use std::fmt;

/// Access granularity of a single memory operation, in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkSize {
    Bits32,
    Bits64,
    Bits128,
    Bits256,
}

impl ChunkSize {
    /// All chunk sizes, widest last.
    pub const ALL: [ChunkSize; 4] = [
        ChunkSize::Bits32,
        ChunkSize::Bits64,
        ChunkSize::Bits128,
        ChunkSize::Bits256,
    ];

    pub fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
            Self::Bits128 => 128,
            Self::Bits256 => 256,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Self::Bits32),
            64 => Some(Self::Bits64),
            128 => Some(Self::Bits128),
            256 => Some(Self::Bits256),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Broad shape of the address stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    Sequential,
    Random,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "SEQUENTIAL"),
            Self::Random => write!(f, "RANDOM"),
        }
    }
}

/// Whether the kernel loads or stores. Stores write an all-ones pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RwMode {
    Read,
    Write,
}

impl fmt::Display for RwMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Write => write!(f, "WRITE"),
        }
    }
}

/// Strides supported by the sequential kernel family, in chunks. Sign is
/// direction.
pub const SUPPORTED_STRIDES: [i64; 10] = [1, -1, 2, -2, 4, -4, 8, -8, 16, -16];

/// A sequential-family kernel. Walks `[start, end)` forward or `(start, end]`
/// backward. The return value only exists to pin side effects; callers ignore
/// it.
pub type SequentialKernel = unsafe fn(start: *mut u8, end: *mut u8) -> i32;

/// A random-family kernel. Chases pointers beginning at `first`, writes the
/// last address touched through `last_touched_out`, and takes the region
/// length for size-based traversals.
pub type RandomKernel =
    unsafe fn(first: *mut usize, last_touched_out: *mut *mut usize, len_bytes: usize) -> i32;

/// Real kernel plus its loop-overhead dummy.
#[derive(Clone, Copy)]
pub struct SequentialKernelPair {
    pub kernel: SequentialKernel,
    pub dummy: SequentialKernel,
}

#[derive(Clone, Copy)]
pub struct RandomKernelPair {
    pub kernel: RandomKernel,
    pub dummy: RandomKernel,
}

/// Whether this build/CPU can run kernels of the given chunk size.
pub fn chunk_supported(chunk: ChunkSize) -> bool {
    match chunk {
        ChunkSize::Bits32 | ChunkSize::Bits64 => true,
        ChunkSize::Bits128 | ChunkSize::Bits256 => {
            #[cfg(target_arch = "x86_64")]
            {
                std::arch::is_x86_feature_detected!("avx")
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                false
            }
        }
    }
}

/// Map a sequential configuration to its kernel pair, or `None` when the
/// combination is unsupported on this build/CPU.
pub fn resolve_sequential(
    rw: RwMode,
    chunk: ChunkSize,
    stride: i64,
) -> Option<SequentialKernelPair> {
    if !SUPPORTED_STRIDES.contains(&stride) || !chunk_supported(chunk) {
        return None;
    }
    sequential::lookup(rw, chunk, stride)
}

/// Map a random configuration to its kernel pair. 32-bit chunks cannot hold a
/// 64-bit pointer and are always unsupported.
pub fn resolve_random(rw: RwMode, chunk: ChunkSize) -> Option<RandomKernelPair> {
    if chunk == ChunkSize::Bits32 || !chunk_supported(chunk) {
        return None;
    }
    random::lookup(rw, chunk)
}

/// Delay values available for the delay-injected load kernels, in nops per
/// access.
pub const SUPPORTED_DELAYS: [u32; 12] = [0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

/// Map a delay-injected sequential read configuration to its kernel pair.
/// Delay 0 resolves to the plain forward sequential read. Only 64-bit and
/// 256-bit chunks carry delay variants.
pub fn resolve_delay_injected(chunk: ChunkSize, delay: u32) -> Option<SequentialKernelPair> {
    if !chunk_supported(chunk) {
        return None;
    }
    if delay == 0 {
        return resolve_sequential(RwMode::Read, chunk, 1);
    }
    delays::lookup(chunk, delay)
}
