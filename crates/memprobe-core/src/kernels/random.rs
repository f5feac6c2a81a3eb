//! Random-family kernels: dependent pointer chases over a prebuilt
//! permutation (see [`crate::graph`]).
//!
//! Each access loads the chunk at the cursor and takes its low 64 bits as the
//! next address, so every load depends on the previous one and the memory
//! level's true latency is exposed. Write variants store the loaded value
//! back before chasing. The last address touched is reported out so the next
//! invocation can resume the chain where this one left off.
//!
//! The dummies preserve the call and address-extraction cost without
//! dereferencing anything.

use std::ptr;

use super::{ChunkSize, RandomKernel, RandomKernelPair, RwMode};

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{
    __m128i, __m256i, _mm_extract_epi64, _mm_set1_epi64x, _mm256_extract_epi64,
    _mm256_set1_epi64x,
};

/// Chase 64-bit pointers, 512 hops per invocation.
pub unsafe fn random_read_word64(
    first: *mut usize,
    last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let mut p = first as *const usize;
        unroll512!(p = ptr::read_volatile(p) as *const usize;);
        *last_touched_out = p as *mut usize;
    }
    0
}

/// Chase 64-bit pointers, storing each loaded value back before the hop.
pub unsafe fn random_write_word64(
    first: *mut usize,
    last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let mut p = first;
        unroll512!(
            let next = ptr::read_volatile(p);
            ptr::write_volatile(p, next);
            p = next as *mut usize;
        );
        *last_touched_out = p;
    }
    0
}

/// Mimics the 64-bit chase call without touching memory.
pub unsafe fn dummy_random_loop_word64(
    _first: *mut usize,
    _last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    let placeholder: *const usize = ptr::null();
    let _ = std::hint::black_box(placeholder);
    0
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn random_read_word128(
    first: *mut usize,
    last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let mut p = first as *const __m128i;
        unroll256!(
            let val = ptr::read_volatile(p);
            p = _mm_extract_epi64(val, 0) as usize as *const __m128i;
        );
        *last_touched_out = p as *mut usize;
    }
    0
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn random_write_word128(
    first: *mut usize,
    last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let mut p = first as *mut __m128i;
        unroll256!(
            let val = ptr::read_volatile(p);
            ptr::write_volatile(p, val);
            p = _mm_extract_epi64(val, 0) as usize as *mut __m128i;
        );
        *last_touched_out = p as *mut usize;
    }
    0
}

/// Mimics the 128-bit chase: keeps the 64-bit lane extraction, drops the
/// dereference.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn dummy_random_loop_word128(
    _first: *mut usize,
    _last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let val = _mm_set1_epi64x(-1);
        let mut extracted: u64 = 0;
        unroll256!(ptr::write_volatile(&mut extracted, _mm_extract_epi64(val, 0) as u64););
        let _ = ptr::read_volatile(&extracted);
    }
    0
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn random_read_word256(
    first: *mut usize,
    last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let mut p = first as *const __m256i;
        unroll128!(
            let val = ptr::read_volatile(p);
            p = _mm256_extract_epi64(val, 0) as usize as *const __m256i;
        );
        *last_touched_out = p as *mut usize;
    }
    0
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn random_write_word256(
    first: *mut usize,
    last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let mut p = first as *mut __m256i;
        unroll128!(
            let val = ptr::read_volatile(p);
            ptr::write_volatile(p, val);
            p = _mm256_extract_epi64(val, 0) as usize as *mut __m256i;
        );
        *last_touched_out = p as *mut usize;
    }
    0
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx")]
pub unsafe fn dummy_random_loop_word256(
    _first: *mut usize,
    _last_touched_out: *mut *mut usize,
    _len_bytes: usize,
) -> i32 {
    unsafe {
        let val = _mm256_set1_epi64x(-1);
        let mut extracted: u64 = 0;
        unroll128!(ptr::write_volatile(&mut extracted, _mm256_extract_epi64(val, 0) as u64););
        let _ = ptr::read_volatile(&extracted);
    }
    0
}

pub(super) fn lookup(rw: RwMode, chunk: ChunkSize) -> Option<RandomKernelPair> {
    match (rw, chunk) {
        (RwMode::Read, ChunkSize::Bits64) => Some(RandomKernelPair {
            kernel: random_read_word64 as RandomKernel,
            dummy: dummy_random_loop_word64 as RandomKernel,
        }),
        (RwMode::Write, ChunkSize::Bits64) => Some(RandomKernelPair {
            kernel: random_write_word64 as RandomKernel,
            dummy: dummy_random_loop_word64 as RandomKernel,
        }),
        #[cfg(target_arch = "x86_64")]
        (RwMode::Read, ChunkSize::Bits128) => Some(RandomKernelPair {
            kernel: random_read_word128 as RandomKernel,
            dummy: dummy_random_loop_word128 as RandomKernel,
        }),
        #[cfg(target_arch = "x86_64")]
        (RwMode::Write, ChunkSize::Bits128) => Some(RandomKernelPair {
            kernel: random_write_word128 as RandomKernel,
            dummy: dummy_random_loop_word128 as RandomKernel,
        }),
        #[cfg(target_arch = "x86_64")]
        (RwMode::Read, ChunkSize::Bits256) => Some(RandomKernelPair {
            kernel: random_read_word256 as RandomKernel,
            dummy: dummy_random_loop_word256 as RandomKernel,
        }),
        #[cfg(target_arch = "x86_64")]
        (RwMode::Write, ChunkSize::Bits256) => Some(RandomKernelPair {
            kernel: random_write_word256 as RandomKernel,
            dummy: dummy_random_loop_word256 as RandomKernel,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_random_pointer_permutation;

    /// A chase-ready region: enough chunks that 512 hops stay interesting,
    /// page-aligned for the widest chunk.
    #[repr(C, align(4096))]
    struct Region {
        words: [u64; 1024],
    }

    #[test]
    fn chase_follows_the_permutation() {
        let mut buf = Box::new(Region { words: [0; 1024] });
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            1024 * 8,
            ChunkSize::Bits64,
            Some(7)
        ));

        let mut last: *mut usize = std::ptr::null_mut();
        unsafe {
            random_read_word64(base as *mut usize, &mut last, 1024 * 8);
        }
        // The chase must end somewhere inside the region, on a chunk boundary.
        let off = last as usize - base as usize;
        assert!(off < 1024 * 8);
        assert_eq!(off % 8, 0);
    }

    #[test]
    fn chase_resumes_from_last_touched() {
        let mut buf = Box::new(Region { words: [0; 1024] });
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            1024 * 8,
            ChunkSize::Bits64,
            Some(11)
        ));

        let mut a: *mut usize = std::ptr::null_mut();
        let mut b: *mut usize = std::ptr::null_mut();
        unsafe {
            random_read_word64(base as *mut usize, &mut a, 1024 * 8);
            random_read_word64(a, &mut b, 1024 * 8);
        }
        let off = b as usize - base as usize;
        assert!(off < 1024 * 8);
    }

    #[test]
    fn write_chase_preserves_the_chain() {
        let mut buf = Box::new(Region { words: [0; 1024] });
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            1024 * 8,
            ChunkSize::Bits64,
            Some(3)
        ));
        let before = buf.words;

        let mut last: *mut usize = std::ptr::null_mut();
        unsafe {
            random_write_word64(base as *mut usize, &mut last, 1024 * 8);
        }
        // Stores write back the loaded pointers, so the graph is unchanged.
        assert_eq!(before, buf.words);
    }

    #[test]
    fn dummy_does_not_touch_memory_or_the_out_pointer() {
        let mut last: *mut usize = std::ptr::null_mut();
        unsafe {
            assert_eq!(dummy_random_loop_word64(std::ptr::null_mut(), &mut last, 0), 0);
        }
        assert!(last.is_null());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn chase_word256_follows_low_lane() {
        if !std::arch::is_x86_feature_detected!("avx") {
            return;
        }
        let mut buf = Box::new(Region { words: [0; 1024] });
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            1024 * 8,
            ChunkSize::Bits256,
            Some(5)
        ));

        let mut last: *mut usize = std::ptr::null_mut();
        unsafe {
            random_read_word256(base as *mut usize, &mut last, 1024 * 8);
        }
        let off = last as usize - base as usize;
        assert!(off < 1024 * 8);
        assert_eq!(off % 32, 0);
    }
}
