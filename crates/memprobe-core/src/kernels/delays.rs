//! Delay-injected load kernels for the loaded-latency benchmark.
//!
//! Forward sequential reads with a fixed number of `nop` instructions after
//! every access. Raising the delay throttles the background load smoothly,
//! which sweeps the memory system from idle to saturated while one worker
//! measures latency. Matching dummies replay the loop without accesses or
//! nops, so the subtracted overhead is the loop alone and the measured load
//! throughput reflects the injected delay.
//!
//! Delay 0 is not in this module: it resolves to the plain forward
//! sequential read.

use std::ptr;

use super::{ChunkSize, SequentialKernel, SequentialKernelPair};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::__m256i;

/// One `nop`, doubled upward like the unroll macros.
macro_rules! nops1 {
    () => {
        std::arch::asm!("nop", options(nomem, nostack, preserves_flags))
    };
}
macro_rules! nops2 {
    () => {{ nops1!(); nops1!(); }};
}
macro_rules! nops4 {
    () => {{ nops2!(); nops2!(); }};
}
macro_rules! nops8 {
    () => {{ nops4!(); nops4!(); }};
}
macro_rules! nops16 {
    () => {{ nops8!(); nops8!(); }};
}
macro_rules! nops32 {
    () => {{ nops16!(); nops16!(); }};
}
macro_rules! nops64 {
    () => {{ nops32!(); nops32!(); }};
}
macro_rules! nops128 {
    () => {{ nops64!(); nops64!(); }};
}
macro_rules! nops256 {
    () => {{ nops128!(); nops128!(); }};
}
macro_rules! nops512 {
    () => {{ nops256!(); nops256!(); }};
}
macro_rules! nops1024 {
    () => {{ nops512!(); nops512!(); }};
}

/// Forward sequential read with `$nops` nops per access, unrolled `$unroll`
/// times per loop iteration.
macro_rules! delay_read_kernel {
    ($(#[$attr:meta])* $word:ty, $unroll:ident, $nops:ident, $name:ident) => {
        $(#[$attr])*
        pub unsafe fn $name(start: *mut u8, end: *mut u8) -> i32 {
            unsafe {
                let mut ptr = start as *mut $word;
                let end = end as *mut $word;
                while ptr < end {
                    $unroll!(
                        let _ = ptr::read_volatile(ptr);
                        ptr = ptr.add(1);
                        $nops!();
                    );
                }
            }
            0
        }
    };
}

/// Loop-overhead dummy matching a delay kernel's unroll factor. No accesses,
/// no nops.
macro_rules! delay_dummy_kernel {
    ($(#[$attr:meta])* $word:ty, $unroll:ident, $name:ident) => {
        $(#[$attr])*
        pub unsafe fn $name(start: *mut u8, end: *mut u8) -> i32 {
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
    };
}

// ---------------------------------------------------------------------------
// 64-bit chunks
// ---------------------------------------------------------------------------

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
mod word64 {
    use super::*;

    delay_read_kernel!(u64, unroll256, nops1, forw_sequential_read_word64_delay1);
    delay_read_kernel!(u64, unroll128, nops2, forw_sequential_read_word64_delay2);
    delay_read_kernel!(u64, unroll64, nops4, forw_sequential_read_word64_delay4);
    delay_read_kernel!(u64, unroll32, nops8, forw_sequential_read_word64_delay8);
    delay_read_kernel!(u64, unroll16, nops16, forw_sequential_read_word64_delay16);
    delay_read_kernel!(u64, unroll8, nops32, forw_sequential_read_word64_delay32);
    delay_read_kernel!(u64, unroll4, nops64, forw_sequential_read_word64_delay64);
    delay_read_kernel!(u64, unroll2, nops128, forw_sequential_read_word64_delay128);
    delay_read_kernel!(u64, unroll1, nops256, forw_sequential_read_word64_delay256);
    delay_read_kernel!(u64, unroll1, nops512, forw_sequential_read_word64_delay512);
    delay_read_kernel!(u64, unroll1, nops1024, forw_sequential_read_word64_delay1024);

    delay_dummy_kernel!(u64, unroll256, dummy_forw_sequential_loop_word64_delay1);
    delay_dummy_kernel!(u64, unroll128, dummy_forw_sequential_loop_word64_delay2);
    delay_dummy_kernel!(u64, unroll64, dummy_forw_sequential_loop_word64_delay4);
    delay_dummy_kernel!(u64, unroll32, dummy_forw_sequential_loop_word64_delay8);
    delay_dummy_kernel!(u64, unroll16, dummy_forw_sequential_loop_word64_delay16);
    delay_dummy_kernel!(u64, unroll8, dummy_forw_sequential_loop_word64_delay32);
    delay_dummy_kernel!(u64, unroll4, dummy_forw_sequential_loop_word64_delay64);
    delay_dummy_kernel!(u64, unroll2, dummy_forw_sequential_loop_word64_delay128);
    delay_dummy_kernel!(u64, unroll1, dummy_forw_sequential_loop_word64_delay256plus);
}

// ---------------------------------------------------------------------------
// 256-bit chunks (x86_64 + AVX builds only)
// ---------------------------------------------------------------------------

#[cfg(target_arch = "x86_64")]
mod word256 {
    use super::*;

    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll64, nops1, forw_sequential_read_word256_delay1
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll32, nops2, forw_sequential_read_word256_delay2
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll16, nops4, forw_sequential_read_word256_delay4
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll8, nops8, forw_sequential_read_word256_delay8
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll4, nops16, forw_sequential_read_word256_delay16
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll2, nops32, forw_sequential_read_word256_delay32
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll1, nops64, forw_sequential_read_word256_delay64
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll1, nops128, forw_sequential_read_word256_delay128
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll1, nops256, forw_sequential_read_word256_delay256
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll1, nops512, forw_sequential_read_word256_delay512
    );
    delay_read_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll1, nops1024, forw_sequential_read_word256_delay1024
    );

    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll64, dummy_forw_sequential_loop_word256_delay1
    );
    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll32, dummy_forw_sequential_loop_word256_delay2
    );
    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll16, dummy_forw_sequential_loop_word256_delay4
    );
    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll8, dummy_forw_sequential_loop_word256_delay8
    );
    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll4, dummy_forw_sequential_loop_word256_delay16
    );
    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll2, dummy_forw_sequential_loop_word256_delay32
    );
    delay_dummy_kernel!(
        #[target_feature(enable = "avx")]
        __m256i, unroll1, dummy_forw_sequential_loop_word256_delay64plus
    );
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn lookup_word64(delay: u32) -> Option<SequentialKernelPair> {
    use word64::*;
    let pair: (SequentialKernel, SequentialKernel) = match delay {
        1 => (
            forw_sequential_read_word64_delay1 as _,
            dummy_forw_sequential_loop_word64_delay1 as _,
        ),
        2 => (
            forw_sequential_read_word64_delay2 as _,
            dummy_forw_sequential_loop_word64_delay2 as _,
        ),
        4 => (
            forw_sequential_read_word64_delay4 as _,
            dummy_forw_sequential_loop_word64_delay4 as _,
        ),
        8 => (
            forw_sequential_read_word64_delay8 as _,
            dummy_forw_sequential_loop_word64_delay8 as _,
        ),
        16 => (
            forw_sequential_read_word64_delay16 as _,
            dummy_forw_sequential_loop_word64_delay16 as _,
        ),
        32 => (
            forw_sequential_read_word64_delay32 as _,
            dummy_forw_sequential_loop_word64_delay32 as _,
        ),
        64 => (
            forw_sequential_read_word64_delay64 as _,
            dummy_forw_sequential_loop_word64_delay64 as _,
        ),
        128 => (
            forw_sequential_read_word64_delay128 as _,
            dummy_forw_sequential_loop_word64_delay128 as _,
        ),
        256 => (
            forw_sequential_read_word64_delay256 as _,
            dummy_forw_sequential_loop_word64_delay256plus as _,
        ),
        512 => (
            forw_sequential_read_word64_delay512 as _,
            dummy_forw_sequential_loop_word64_delay256plus as _,
        ),
        1024 => (
            forw_sequential_read_word64_delay1024 as _,
            dummy_forw_sequential_loop_word64_delay256plus as _,
        ),
        _ => return None,
    };
    Some(SequentialKernelPair {
        kernel: pair.0,
        dummy: pair.1,
    })
}

#[cfg(target_arch = "x86_64")]
fn lookup_word256(delay: u32) -> Option<SequentialKernelPair> {
    use word256::*;
    let pair: (SequentialKernel, SequentialKernel) = match delay {
        1 => (
            forw_sequential_read_word256_delay1 as _,
            dummy_forw_sequential_loop_word256_delay1 as _,
        ),
        2 => (
            forw_sequential_read_word256_delay2 as _,
            dummy_forw_sequential_loop_word256_delay2 as _,
        ),
        4 => (
            forw_sequential_read_word256_delay4 as _,
            dummy_forw_sequential_loop_word256_delay4 as _,
        ),
        8 => (
            forw_sequential_read_word256_delay8 as _,
            dummy_forw_sequential_loop_word256_delay8 as _,
        ),
        16 => (
            forw_sequential_read_word256_delay16 as _,
            dummy_forw_sequential_loop_word256_delay16 as _,
        ),
        32 => (
            forw_sequential_read_word256_delay32 as _,
            dummy_forw_sequential_loop_word256_delay32 as _,
        ),
        64 => (
            forw_sequential_read_word256_delay64 as _,
            dummy_forw_sequential_loop_word256_delay64plus as _,
        ),
        128 => (
            forw_sequential_read_word256_delay128 as _,
            dummy_forw_sequential_loop_word256_delay64plus as _,
        ),
        256 => (
            forw_sequential_read_word256_delay256 as _,
            dummy_forw_sequential_loop_word256_delay64plus as _,
        ),
        512 => (
            forw_sequential_read_word256_delay512 as _,
            dummy_forw_sequential_loop_word256_delay64plus as _,
        ),
        1024 => (
            forw_sequential_read_word256_delay1024 as _,
            dummy_forw_sequential_loop_word256_delay64plus as _,
        ),
        _ => return None,
    };
    Some(SequentialKernelPair {
        kernel: pair.0,
        dummy: pair.1,
    })
}

pub(super) fn lookup(chunk: ChunkSize, delay: u32) -> Option<SequentialKernelPair> {
    match chunk {
        ChunkSize::Bits64 => {
            #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
            {
                lookup_word64(delay)
            }
            #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
            {
                let _ = delay;
                None
            }
        }
        ChunkSize::Bits256 => {
            #[cfg(target_arch = "x86_64")]
            {
                lookup_word256(delay)
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                None
            }
        }
        _ => None,
    }
}
