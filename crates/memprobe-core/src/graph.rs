//! Random pointer-permutation builder for the latency workload.
//!
//! The region is viewed as an array of chunks. Each chunk's first 64-bit word
//! is initialized to the chunk's own address (the identity permutation), then
//! the chunks are shuffled uniformly. Shuffling a permutation yields a
//! permutation, so following the stored addresses from any chunk covers every
//! chunk of its cycle exactly once before closing. The shuffle may produce
//! more than one cycle; that is accepted in exchange for O(n) construction.
//!
//! Chunks wider than 64 bits carry all-ones in every non-pointer word so SIMD
//! loads see a fixed upper-lane pattern.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::kernels::ChunkSize;

/// Build the pointer permutation in `[base, base + len)`.
///
/// `len` must be a multiple of the chunk size; 32-bit chunks cannot hold a
/// 64-bit pointer and are rejected. Pass a fixed `seed` for a reproducible
/// graph; `None` seeds from the wall clock.
///
/// Returns `false` when the region or chunk size cannot host a chase graph.
pub fn build_random_pointer_permutation(
    base: *mut u8,
    len: usize,
    chunk: ChunkSize,
    seed: Option<u64>,
) -> bool {
    if base.is_null() || chunk == ChunkSize::Bits32 {
        return false;
    }
    let num_pointers = len / chunk.bytes();
    if num_pointers == 0 {
        return false;
    }

    let seed = seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    });
    let mut rng = StdRng::seed_from_u64(seed);

    match chunk {
        ChunkSize::Bits64 => {
            // SAFETY: the caller hands us an exclusive region of at least
            // num_pointers chunks, aligned for the chunk width.
            let chunks =
                unsafe { std::slice::from_raw_parts_mut(base as *mut u64, num_pointers) };
            for (i, slot) in chunks.iter_mut().enumerate() {
                *slot = base as u64 + (i * 8) as u64;
            }
            chunks.shuffle(&mut rng);
        }
        ChunkSize::Bits128 => {
            // SAFETY: as above; [u64; 2] has the chunk's size and a layout
            // the 8-byte-aligned region satisfies.
            let chunks =
                unsafe { std::slice::from_raw_parts_mut(base as *mut [u64; 2], num_pointers) };
            for (i, slot) in chunks.iter_mut().enumerate() {
                slot[0] = base as u64 + (i * 16) as u64;
                slot[1] = u64::MAX;
            }
            chunks.shuffle(&mut rng);
        }
        ChunkSize::Bits256 => {
            // SAFETY: as above.
            let chunks =
                unsafe { std::slice::from_raw_parts_mut(base as *mut [u64; 4], num_pointers) };
            for (i, slot) in chunks.iter_mut().enumerate() {
                slot[0] = base as u64 + (i * 32) as u64;
                slot[1] = u64::MAX;
                slot[2] = u64::MAX;
                slot[3] = u64::MAX;
            }
            chunks.shuffle(&mut rng);
        }
        ChunkSize::Bits32 => unreachable!(),
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4096))]
    struct Region {
        words: [u64; 512],
    }

    fn region() -> Box<Region> {
        Box::new(Region { words: [0; 512] })
    }

    /// Walk the permutation from every unvisited chunk; every chunk must be
    /// visited exactly once across all cycles, and each cycle must close.
    fn assert_cycle_cover(base: *mut u8, len: usize, chunk_bytes: usize) {
        let n = len / chunk_bytes;
        let index_of = |addr: u64| -> usize {
            let off = addr as usize - base as usize;
            assert_eq!(off % chunk_bytes, 0, "pointer not chunk-aligned");
            assert!(off < len, "pointer outside the region");
            off / chunk_bytes
        };
        let read_slot = |i: usize| -> u64 {
            // SAFETY: i < n, inside the region.
            unsafe { *(base.add(i * chunk_bytes) as *const u64) }
        };

        let mut visited = vec![false; n];
        for start in 0..n {
            if visited[start] {
                continue;
            }
            let mut at = start;
            loop {
                assert!(!visited[at], "chunk {at} reached twice");
                visited[at] = true;
                at = index_of(read_slot(at));
                if at == start {
                    break;
                }
            }
        }
        assert!(visited.iter().all(|&v| v), "some chunk was never reached");
    }

    #[test]
    fn word64_graph_is_a_permutation() {
        let mut buf = region();
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            4096,
            ChunkSize::Bits64,
            Some(42)
        ));
        assert_cycle_cover(base, 4096, 8);
    }

    #[test]
    fn word128_graph_pads_upper_words_with_ones() {
        let mut buf = region();
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            4096,
            ChunkSize::Bits128,
            Some(42)
        ));
        assert_cycle_cover(base, 4096, 16);
        for pair in buf.words.chunks(2) {
            assert_eq!(pair[1], u64::MAX);
        }
    }

    #[test]
    fn word256_graph_pads_upper_words_with_ones() {
        let mut buf = region();
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            4096,
            ChunkSize::Bits256,
            Some(9)
        ));
        assert_cycle_cover(base, 4096, 32);
        for quad in buf.words.chunks(4) {
            assert_eq!(&quad[1..], &[u64::MAX; 3]);
        }
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let mut a = region();
        let mut b = region();
        // Same seed, different base addresses: the link *structure* (index
        // permutation) must match even though raw pointer values differ.
        let base_a = a.words.as_mut_ptr() as *mut u8;
        let base_b = b.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(base_a, 4096, ChunkSize::Bits64, Some(1)));
        assert!(build_random_pointer_permutation(base_b, 4096, ChunkSize::Bits64, Some(1)));
        let idx = |words: &[u64; 512], base: *mut u8| -> Vec<usize> {
            words
                .iter()
                .map(|&w| (w as usize - base as usize) / 8)
                .collect()
        };
        assert_eq!(idx(&a.words, base_a), idx(&b.words, base_b));
    }

    #[test]
    fn single_chunk_region_points_at_itself() {
        let mut buf = region();
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(build_random_pointer_permutation(
            base,
            8,
            ChunkSize::Bits64,
            Some(1)
        ));
        assert_eq!(buf.words[0], base as u64);
    }

    #[test]
    fn rejected_configurations() {
        let mut buf = region();
        let base = buf.words.as_mut_ptr() as *mut u8;
        assert!(!build_random_pointer_permutation(
            base,
            4096,
            ChunkSize::Bits32,
            Some(1)
        ));
        assert!(!build_random_pointer_permutation(
            std::ptr::null_mut(),
            4096,
            ChunkSize::Bits64,
            Some(1)
        ));
        assert!(!build_random_pointer_permutation(base, 0, ChunkSize::Bits64, Some(1)));
    }
}
