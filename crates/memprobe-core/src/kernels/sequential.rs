//! Sequential-family kernels: forward/reverse, strides 1..16 chunks, all
//! chunk widths, read and write, each with its loop-overhead dummy.
//!
//! Hardcoding the stride and chunk width in every routine keeps runtime
//! arithmetic out of the timed loop. Cursors go through volatile accesses so
//! every read issues a load and every write issues a store.
//!
//! Callers pass a region whose length is a multiple of 4096 bytes (one loop
//! iteration of address progress) and guarantee one readable/writable word at
//! `end`: reverse kernels touch it on their first access.

use std::ptr;

use super::{ChunkSize, RwMode, SequentialKernel, SequentialKernelPair};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{__m128i, __m256i, _mm_set1_epi64x, _mm256_set1_epi64x};

/// Generates the six stride-1 routines for one word type: forward/reverse ×
/// read/write/dummy. The loop advances until the cursor reaches the far
/// boundary; no wrap is needed at stride 1.
macro_rules! sequential_kernels {
    ($(#[$attr:meta])* $word:ty, $ones:expr, $unroll:ident,
     $forw_read:ident, $rev_read:ident, $forw_write:ident, $rev_write:ident,
     $forw_dummy:ident, $rev_dummy:ident) => {
        $(#[$attr])*
        pub unsafe fn $forw_read(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                while ptr < end {
                    $unroll!(let _ = ptr::read_volatile(ptr); ptr = ptr.add(1););
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $rev_read(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let mut ptr = end as *mut $word;
                let begin = start as *mut $word;
                while ptr > begin {
                    $unroll!(let _ = ptr::read_volatile(ptr); ptr = ptr.sub(1););
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $forw_write(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let val: $word = $ones;
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                while ptr < end {
                    $unroll!(ptr::write_volatile(ptr, val); ptr = ptr.add(1););
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $rev_write(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let val: $word = $ones;
                let mut ptr = end as *mut $word;
                let begin = start as *mut $word;
                while ptr > begin {
                    $unroll!(ptr::write_volatile(ptr, val); ptr = ptr.sub(1););
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $forw_dummy(start: *mut u8, end: *mut u8) -> i32 {
            let mut placeholder: i32 = 0;
            unsafe {
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                while ptr < end {
                    $unroll!(ptr = ptr.add(1););
                    ptr::write_volatile(&mut placeholder, 0);
                }
                ptr::read_volatile(&placeholder)
            }
        }

        $(#[$attr])*
        pub unsafe fn $rev_dummy(start: *mut u8, end: *mut u8) -> i32 {
            let mut placeholder: i32 = 0;
            unsafe {
                let mut ptr = end as *mut $word;
                let begin = start as *mut $word;
                while ptr > begin {
                    $unroll!(ptr = ptr.sub(1););
                    ptr::write_volatile(&mut placeholder, 0);
                }
                ptr::read_volatile(&placeholder)
            }
        }
    };
}

/// Generates the six routines for one (word type, stride) combination.
/// The loop is counted in accesses; when the cursor crosses the far boundary
/// it wraps by the region length, at iteration granularity only.
macro_rules! strided_kernels {
    ($(#[$attr:meta])* $word:ty, $ones:expr, $stride:expr, $unroll:ident, $count:expr,
     $forw_read:ident, $rev_read:ident, $forw_write:ident, $rev_write:ident,
     $forw_dummy:ident, $rev_dummy:ident) => {
        $(#[$attr])*
        pub unsafe fn $forw_read(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let len = (end as usize - start as usize) / std::mem::size_of::<$word>();
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                let mut i: usize = 0;
                while i < len {
                    $unroll!(let _ = ptr::read_volatile(ptr); ptr = ptr.add($stride););
                    if ptr >= end {
                        ptr = ptr.sub(len);
                    }
                    i += $count;
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $rev_read(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let len = (end as usize - start as usize) / std::mem::size_of::<$word>();
                let begin = start as *mut $word;
                let mut ptr = end as *mut $word;
                let mut i: usize = 0;
                while i < len {
                    $unroll!(let _ = ptr::read_volatile(ptr); ptr = ptr.sub($stride););
                    if ptr <= begin {
                        ptr = ptr.add(len);
                    }
                    i += $count;
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $forw_write(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let val: $word = $ones;
                let len = (end as usize - start as usize) / std::mem::size_of::<$word>();
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                let mut i: usize = 0;
                while i < len {
                    $unroll!(ptr::write_volatile(ptr, val); ptr = ptr.add($stride););
                    if ptr >= end {
                        ptr = ptr.sub(len);
                    }
                    i += $count;
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $rev_write(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let val: $word = $ones;
                let len = (end as usize - start as usize) / std::mem::size_of::<$word>();
                let begin = start as *mut $word;
                let mut ptr = end as *mut $word;
                let mut i: usize = 0;
                while i < len {
                    $unroll!(ptr::write_volatile(ptr, val); ptr = ptr.sub($stride););
                    if ptr <= begin {
                        ptr = ptr.add(len);
                    }
                    i += $count;
                }
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $forw_dummy(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let len = (end as usize - start as usize) / std::mem::size_of::<$word>();
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                let mut i: usize = 0;
                while i < len {
                    $unroll!(ptr = ptr.add($stride););
                    if ptr >= end {
                        ptr = ptr.sub(len);
                    }
                    i += $count;
                }
                let _ = std::hint::black_box(ptr);
            }
            0
        }

        $(#[$attr])*
        pub unsafe fn $rev_dummy(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let len = (end as usize - start as usize) / std::mem::size_of::<$word>();
                let begin = start as *mut $word;
                let mut ptr = end as *mut $word;
                let mut i: usize = 0;
                while i < len {
                    $unroll!(ptr = ptr.sub($stride););
                    if ptr <= begin {
                        ptr = ptr.add(len);
                    }
                    i += $count;
                }
                let _ = std::hint::black_box(ptr);
            }
            0
        }
    };
}

// ---------------------------------------------------------------------------
// 32-bit chunks
// ---------------------------------------------------------------------------

sequential_kernels!(
    u32, u32::MAX, unroll1024,
    forw_sequential_read_word32, rev_sequential_read_word32,
    forw_sequential_write_word32, rev_sequential_write_word32,
    dummy_forw_sequential_loop_word32, dummy_rev_sequential_loop_word32
);
strided_kernels!(
    u32, u32::MAX, 2, unroll512, 512,
    forw_stride2_read_word32, rev_stride2_read_word32,
    forw_stride2_write_word32, rev_stride2_write_word32,
    dummy_forw_stride2_loop_word32, dummy_rev_stride2_loop_word32
);
strided_kernels!(
    u32, u32::MAX, 4, unroll256, 256,
    forw_stride4_read_word32, rev_stride4_read_word32,
    forw_stride4_write_word32, rev_stride4_write_word32,
    dummy_forw_stride4_loop_word32, dummy_rev_stride4_loop_word32
);
strided_kernels!(
    u32, u32::MAX, 8, unroll128, 128,
    forw_stride8_read_word32, rev_stride8_read_word32,
    forw_stride8_write_word32, rev_stride8_write_word32,
    dummy_forw_stride8_loop_word32, dummy_rev_stride8_loop_word32
);
strided_kernels!(
    u32, u32::MAX, 16, unroll64, 64,
    forw_stride16_read_word32, rev_stride16_read_word32,
    forw_stride16_write_word32, rev_stride16_write_word32,
    dummy_forw_stride16_loop_word32, dummy_rev_stride16_loop_word32
);

// ---------------------------------------------------------------------------
// 64-bit chunks
// ---------------------------------------------------------------------------

sequential_kernels!(
    u64, u64::MAX, unroll512,
    forw_sequential_read_word64, rev_sequential_read_word64,
    forw_sequential_write_word64, rev_sequential_write_word64,
    dummy_forw_sequential_loop_word64, dummy_rev_sequential_loop_word64
);
strided_kernels!(
    u64, u64::MAX, 2, unroll256, 256,
    forw_stride2_read_word64, rev_stride2_read_word64,
    forw_stride2_write_word64, rev_stride2_write_word64,
    dummy_forw_stride2_loop_word64, dummy_rev_stride2_loop_word64
);
strided_kernels!(
    u64, u64::MAX, 4, unroll128, 128,
    forw_stride4_read_word64, rev_stride4_read_word64,
    forw_stride4_write_word64, rev_stride4_write_word64,
    dummy_forw_stride4_loop_word64, dummy_rev_stride4_loop_word64
);
strided_kernels!(
    u64, u64::MAX, 8, unroll64, 64,
    forw_stride8_read_word64, rev_stride8_read_word64,
    forw_stride8_write_word64, rev_stride8_write_word64,
    dummy_forw_stride8_loop_word64, dummy_rev_stride8_loop_word64
);
strided_kernels!(
    u64, u64::MAX, 16, unroll32, 32,
    forw_stride16_read_word64, rev_stride16_read_word64,
    forw_stride16_write_word64, rev_stride16_write_word64,
    dummy_forw_stride16_loop_word64, dummy_rev_stride16_loop_word64
);

// ---------------------------------------------------------------------------
// 128-bit chunks (x86_64 + AVX builds only)
// ---------------------------------------------------------------------------

sequential_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m128i, _mm_set1_epi64x(-1), unroll256,
    forw_sequential_read_word128, rev_sequential_read_word128,
    forw_sequential_write_word128, rev_sequential_write_word128,
    dummy_forw_sequential_loop_word128, dummy_rev_sequential_loop_word128
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m128i, _mm_set1_epi64x(-1), 2, unroll128, 128,
    forw_stride2_read_word128, rev_stride2_read_word128,
    forw_stride2_write_word128, rev_stride2_write_word128,
    dummy_forw_stride2_loop_word128, dummy_rev_stride2_loop_word128
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m128i, _mm_set1_epi64x(-1), 4, unroll64, 64,
    forw_stride4_read_word128, rev_stride4_read_word128,
    forw_stride4_write_word128, rev_stride4_write_word128,
    dummy_forw_stride4_loop_word128, dummy_rev_stride4_loop_word128
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m128i, _mm_set1_epi64x(-1), 8, unroll32, 32,
    forw_stride8_read_word128, rev_stride8_read_word128,
    forw_stride8_write_word128, rev_stride8_write_word128,
    dummy_forw_stride8_loop_word128, dummy_rev_stride8_loop_word128
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m128i, _mm_set1_epi64x(-1), 16, unroll16, 16,
    forw_stride16_read_word128, rev_stride16_read_word128,
    forw_stride16_write_word128, rev_stride16_write_word128,
    dummy_forw_stride16_loop_word128, dummy_rev_stride16_loop_word128
);

// ---------------------------------------------------------------------------
// 256-bit chunks (x86_64 + AVX builds only)
// ---------------------------------------------------------------------------

sequential_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m256i, _mm256_set1_epi64x(-1), unroll128,
    forw_sequential_read_word256, rev_sequential_read_word256,
    forw_sequential_write_word256, rev_sequential_write_word256,
    dummy_forw_sequential_loop_word256, dummy_rev_sequential_loop_word256
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m256i, _mm256_set1_epi64x(-1), 2, unroll64, 64,
    forw_stride2_read_word256, rev_stride2_read_word256,
    forw_stride2_write_word256, rev_stride2_write_word256,
    dummy_forw_stride2_loop_word256, dummy_rev_stride2_loop_word256
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m256i, _mm256_set1_epi64x(-1), 4, unroll32, 32,
    forw_stride4_read_word256, rev_stride4_read_word256,
    forw_stride4_write_word256, rev_stride4_write_word256,
    dummy_forw_stride4_loop_word256, dummy_rev_stride4_loop_word256
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m256i, _mm256_set1_epi64x(-1), 8, unroll16, 16,
    forw_stride8_read_word256, rev_stride8_read_word256,
    forw_stride8_write_word256, rev_stride8_write_word256,
    dummy_forw_stride8_loop_word256, dummy_rev_stride8_loop_word256
);
strided_kernels!(
    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx")]
    __m256i, _mm256_set1_epi64x(-1), 16, unroll8, 8,
    forw_stride16_read_word256, rev_stride16_read_word256,
    forw_stride16_write_word256, rev_stride16_write_word256,
    dummy_forw_stride16_loop_word256, dummy_rev_stride16_loop_word256
);

// ---------------------------------------------------------------------------
// Catalog lookup
// ---------------------------------------------------------------------------

/// Pairs a real kernel with its dummy for one chunk family.
macro_rules! pair {
    ($kernel:ident, $dummy:ident) => {
        Some(SequentialKernelPair {
            kernel: $kernel as SequentialKernel,
            dummy: $dummy as SequentialKernel,
        })
    };
}

fn lookup_word32(rw: RwMode, stride: i64) -> Option<SequentialKernelPair> {
    use RwMode::*;
    match (rw, stride) {
        (Read, 1) => pair!(forw_sequential_read_word32, dummy_forw_sequential_loop_word32),
        (Read, -1) => pair!(rev_sequential_read_word32, dummy_rev_sequential_loop_word32),
        (Read, 2) => pair!(forw_stride2_read_word32, dummy_forw_stride2_loop_word32),
        (Read, -2) => pair!(rev_stride2_read_word32, dummy_rev_stride2_loop_word32),
        (Read, 4) => pair!(forw_stride4_read_word32, dummy_forw_stride4_loop_word32),
        (Read, -4) => pair!(rev_stride4_read_word32, dummy_rev_stride4_loop_word32),
        (Read, 8) => pair!(forw_stride8_read_word32, dummy_forw_stride8_loop_word32),
        (Read, -8) => pair!(rev_stride8_read_word32, dummy_rev_stride8_loop_word32),
        (Read, 16) => pair!(forw_stride16_read_word32, dummy_forw_stride16_loop_word32),
        (Read, -16) => pair!(rev_stride16_read_word32, dummy_rev_stride16_loop_word32),
        (Write, 1) => pair!(forw_sequential_write_word32, dummy_forw_sequential_loop_word32),
        (Write, -1) => pair!(rev_sequential_write_word32, dummy_rev_sequential_loop_word32),
        (Write, 2) => pair!(forw_stride2_write_word32, dummy_forw_stride2_loop_word32),
        (Write, -2) => pair!(rev_stride2_write_word32, dummy_rev_stride2_loop_word32),
        (Write, 4) => pair!(forw_stride4_write_word32, dummy_forw_stride4_loop_word32),
        (Write, -4) => pair!(rev_stride4_write_word32, dummy_rev_stride4_loop_word32),
        (Write, 8) => pair!(forw_stride8_write_word32, dummy_forw_stride8_loop_word32),
        (Write, -8) => pair!(rev_stride8_write_word32, dummy_rev_stride8_loop_word32),
        (Write, 16) => pair!(forw_stride16_write_word32, dummy_forw_stride16_loop_word32),
        (Write, -16) => pair!(rev_stride16_write_word32, dummy_rev_stride16_loop_word32),
        _ => None,
    }
}

fn lookup_word64(rw: RwMode, stride: i64) -> Option<SequentialKernelPair> {
    use RwMode::*;
    match (rw, stride) {
        (Read, 1) => pair!(forw_sequential_read_word64, dummy_forw_sequential_loop_word64),
        (Read, -1) => pair!(rev_sequential_read_word64, dummy_rev_sequential_loop_word64),
        (Read, 2) => pair!(forw_stride2_read_word64, dummy_forw_stride2_loop_word64),
        (Read, -2) => pair!(rev_stride2_read_word64, dummy_rev_stride2_loop_word64),
        (Read, 4) => pair!(forw_stride4_read_word64, dummy_forw_stride4_loop_word64),
        (Read, -4) => pair!(rev_stride4_read_word64, dummy_rev_stride4_loop_word64),
        (Read, 8) => pair!(forw_stride8_read_word64, dummy_forw_stride8_loop_word64),
        (Read, -8) => pair!(rev_stride8_read_word64, dummy_rev_stride8_loop_word64),
        (Read, 16) => pair!(forw_stride16_read_word64, dummy_forw_stride16_loop_word64),
        (Read, -16) => pair!(rev_stride16_read_word64, dummy_rev_stride16_loop_word64),
        (Write, 1) => pair!(forw_sequential_write_word64, dummy_forw_sequential_loop_word64),
        (Write, -1) => pair!(rev_sequential_write_word64, dummy_rev_sequential_loop_word64),
        (Write, 2) => pair!(forw_stride2_write_word64, dummy_forw_stride2_loop_word64),
        (Write, -2) => pair!(rev_stride2_write_word64, dummy_rev_stride2_loop_word64),
        (Write, 4) => pair!(forw_stride4_write_word64, dummy_forw_stride4_loop_word64),
        (Write, -4) => pair!(rev_stride4_write_word64, dummy_rev_stride4_loop_word64),
        (Write, 8) => pair!(forw_stride8_write_word64, dummy_forw_stride8_loop_word64),
        (Write, -8) => pair!(rev_stride8_write_word64, dummy_rev_stride8_loop_word64),
        (Write, 16) => pair!(forw_stride16_write_word64, dummy_forw_stride16_loop_word64),
        (Write, -16) => pair!(rev_stride16_write_word64, dummy_rev_stride16_loop_word64),
        _ => None,
    }
}

#[cfg(target_arch = "x86_64")]
fn lookup_word128(rw: RwMode, stride: i64) -> Option<SequentialKernelPair> {
    use RwMode::*;
    match (rw, stride) {
        (Read, 1) => pair!(forw_sequential_read_word128, dummy_forw_sequential_loop_word128),
        (Read, -1) => pair!(rev_sequential_read_word128, dummy_rev_sequential_loop_word128),
        (Read, 2) => pair!(forw_stride2_read_word128, dummy_forw_stride2_loop_word128),
        (Read, -2) => pair!(rev_stride2_read_word128, dummy_rev_stride2_loop_word128),
        (Read, 4) => pair!(forw_stride4_read_word128, dummy_forw_stride4_loop_word128),
        (Read, -4) => pair!(rev_stride4_read_word128, dummy_rev_stride4_loop_word128),
        (Read, 8) => pair!(forw_stride8_read_word128, dummy_forw_stride8_loop_word128),
        (Read, -8) => pair!(rev_stride8_read_word128, dummy_rev_stride8_loop_word128),
        (Read, 16) => pair!(forw_stride16_read_word128, dummy_forw_stride16_loop_word128),
        (Read, -16) => pair!(rev_stride16_read_word128, dummy_rev_stride16_loop_word128),
        (Write, 1) => pair!(forw_sequential_write_word128, dummy_forw_sequential_loop_word128),
        (Write, -1) => pair!(rev_sequential_write_word128, dummy_rev_sequential_loop_word128),
        (Write, 2) => pair!(forw_stride2_write_word128, dummy_forw_stride2_loop_word128),
        (Write, -2) => pair!(rev_stride2_write_word128, dummy_rev_stride2_loop_word128),
        (Write, 4) => pair!(forw_stride4_write_word128, dummy_forw_stride4_loop_word128),
        (Write, -4) => pair!(rev_stride4_write_word128, dummy_rev_stride4_loop_word128),
        (Write, 8) => pair!(forw_stride8_write_word128, dummy_forw_stride8_loop_word128),
        (Write, -8) => pair!(rev_stride8_write_word128, dummy_rev_stride8_loop_word128),
        (Write, 16) => pair!(forw_stride16_write_word128, dummy_forw_stride16_loop_word128),
        (Write, -16) => pair!(rev_stride16_write_word128, dummy_rev_stride16_loop_word128),
        _ => None,
    }
}

#[cfg(target_arch = "x86_64")]
fn lookup_word256(rw: RwMode, stride: i64) -> Option<SequentialKernelPair> {
    use RwMode::*;
    match (rw, stride) {
        (Read, 1) => pair!(forw_sequential_read_word256, dummy_forw_sequential_loop_word256),
        (Read, -1) => pair!(rev_sequential_read_word256, dummy_rev_sequential_loop_word256),
        (Read, 2) => pair!(forw_stride2_read_word256, dummy_forw_stride2_loop_word256),
        (Read, -2) => pair!(rev_stride2_read_word256, dummy_rev_stride2_loop_word256),
        (Read, 4) => pair!(forw_stride4_read_word256, dummy_forw_stride4_loop_word256),
        (Read, -4) => pair!(rev_stride4_read_word256, dummy_rev_stride4_loop_word256),
        (Read, 8) => pair!(forw_stride8_read_word256, dummy_forw_stride8_loop_word256),
        (Read, -8) => pair!(rev_stride8_read_word256, dummy_rev_stride8_loop_word256),
        (Read, 16) => pair!(forw_stride16_read_word256, dummy_forw_stride16_loop_word256),
        (Read, -16) => pair!(rev_stride16_read_word256, dummy_rev_stride16_loop_word256),
        (Write, 1) => pair!(forw_sequential_write_word256, dummy_forw_sequential_loop_word256),
        (Write, -1) => pair!(rev_sequential_write_word256, dummy_rev_sequential_loop_word256),
        (Write, 2) => pair!(forw_stride2_write_word256, dummy_forw_stride2_loop_word256),
        (Write, -2) => pair!(rev_stride2_write_word256, dummy_rev_stride2_loop_word256),
        (Write, 4) => pair!(forw_stride4_write_word256, dummy_forw_stride4_loop_word256),
        (Write, -4) => pair!(rev_stride4_write_word256, dummy_rev_stride4_loop_word256),
        (Write, 8) => pair!(forw_stride8_write_word256, dummy_forw_stride8_loop_word256),
        (Write, -8) => pair!(rev_stride8_write_word256, dummy_rev_stride8_loop_word256),
        (Write, 16) => pair!(forw_stride16_write_word256, dummy_forw_stride16_loop_word256),
        (Write, -16) => pair!(rev_stride16_write_word256, dummy_rev_stride16_loop_word256),
        _ => None,
    }
}

pub(super) fn lookup(rw: RwMode, chunk: ChunkSize, stride: i64) -> Option<SequentialKernelPair> {
    match chunk {
        ChunkSize::Bits32 => lookup_word32(rw, stride),
        ChunkSize::Bits64 => lookup_word64(rw, stride),
        ChunkSize::Bits128 => {
            #[cfg(target_arch = "x86_64")]
            {
                lookup_word128(rw, stride)
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                None
            }
        }
        ChunkSize::Bits256 => {
            #[cfg(target_arch = "x86_64")]
            {
                lookup_word256(rw, stride)
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One 4096-byte pass worth of words plus four words of tail slack:
    /// reverse kernels touch the word at `end`. Page alignment satisfies the
    /// widest (256-bit) volatile access.
    #[repr(C, align(4096))]
    struct Region {
        words: [u64; 516],
    }

    const WORDS: usize = 512;

    fn region() -> Box<Region> {
        Box::new(Region { words: [0; 516] })
    }

    fn bounds(buf: &mut Region) -> (*mut u8, *mut u8) {
        let start = buf.words.as_mut_ptr() as *mut u8;
        (start, unsafe { start.add(WORDS * 8) })
    }

    #[test]
    fn forward_write_covers_every_chunk_once() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            forw_sequential_write_word64(start, end);
        }
        assert!(buf.words[..WORDS].iter().all(|&w| w == u64::MAX));
        // Guard word past `end` untouched by the forward kernel.
        assert_eq!(buf.words[WORDS], 0);
    }

    #[test]
    fn reverse_write_covers_tail_through_end_word() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            rev_sequential_write_word64(start, end);
        }
        // First access lands on the word at `end`; the word at `start` is the
        // loop's stopping point and is not written.
        assert_eq!(buf.words[0], 0);
        assert!(buf.words[1..=WORDS].iter().all(|&w| w == u64::MAX));
        assert_eq!(buf.words[WORDS + 1], 0);
    }

    #[test]
    fn write_then_read_roundtrips_the_sentinel() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            forw_sequential_write_word64(start, end);
            // The read pass must observe what the write pass stored.
            forw_sequential_read_word64(start, end);
        }
        assert!(buf.words[..WORDS].iter().all(|&w| w == u64::MAX));
    }

    #[test]
    fn strided_write_touches_only_stride_multiples() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            forw_stride4_write_word64(start, end);
        }
        for (i, &w) in buf.words[..WORDS].iter().enumerate() {
            if i % 4 == 0 {
                assert_eq!(w, u64::MAX, "chunk {i} should be written");
            } else {
                assert_eq!(w, 0, "chunk {i} should be untouched");
            }
        }
    }

    #[test]
    fn strided_wrap_stays_in_bounds() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            forw_stride16_write_word64(start, end);
            rev_stride16_write_word64(start, end);
        }
        // The wrap rule keeps the cursor inside the region; only the one-word
        // tail slot at `end` may be touched beyond it (by the reverse pass).
        assert_eq!(buf.words[WORDS + 1], 0);
        assert_eq!(buf.words[WORDS + 2], 0);
    }

    #[test]
    fn word32_forward_write_covers_every_chunk() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            forw_sequential_write_word32(start, end);
        }
        assert!(buf.words[..WORDS].iter().all(|&w| w == u64::MAX));
    }

    #[test]
    fn dummies_do_not_touch_memory() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            dummy_forw_sequential_loop_word64(start, end);
            dummy_rev_sequential_loop_word64(start, end);
            dummy_forw_stride4_loop_word64(start, end);
            dummy_rev_stride16_loop_word64(start, end);
        }
        assert!(buf.words.iter().all(|&w| w == 0));
    }

    #[test]
    fn kernels_return_zero() {
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            assert_eq!(forw_sequential_read_word64(start, end), 0);
            assert_eq!(dummy_forw_sequential_loop_word64(start, end), 0);
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn simd_write_fills_with_all_ones() {
        if !std::arch::is_x86_feature_detected!("avx") {
            return;
        }
        let mut buf = region();
        let (start, end) = bounds(&mut buf);
        unsafe {
            forw_sequential_write_word256(start, end);
        }
        assert!(buf.words[..WORDS].iter().all(|&w| w == u64::MAX));
    }

    #[test]
    fn every_stride_magnitude_has_distinct_kernels() {
        let k1 = lookup_word64(RwMode::Read, 1).unwrap();
        let k2 = lookup_word64(RwMode::Read, 2).unwrap();
        assert!(!std::ptr::fn_addr_eq(k1.kernel, k2.kernel));
        assert!(!std::ptr::fn_addr_eq(k1.dummy, k2.dummy));
    }
}
