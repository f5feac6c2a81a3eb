//! NUMA-local, page-aligned memory arenas for benchmarks to run over.
//!
//! One arena is allocated per memory node before any benchmark starts and
//! freed only after every benchmark on that node has finished. Arenas are
//! never resized.
//!
//! Placement uses the first-touch policy: the allocating thread temporarily
//! pins itself to the target node's CPUs and writes every page, so the kernel
//! backs the mapping with node-local frames. When pinning is unavailable (or
//! NUMA is disabled) the arena falls back to UMA placement and says so via
//! [`Arena::numa_local`].

use std::ptr;

use crate::affinity;
use crate::topology::SystemTopology;

/// Page granularity backing an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    Regular,
    Large,
}

/// An aligned, node-bound, never-resized memory region.
///
/// The usable region is `[base, base + len)`; `len` is a multiple of the page
/// size and `base` is aligned to it. The raw mapping keeps at least one extra
/// page past `len`: reverse kernels read the word at `base + len`.
pub struct Arena {
    raw: *mut u8,
    raw_len: usize,
    base: *mut u8,
    len: usize,
    numa_node: u32,
    page_class: PageClass,
    numa_local: bool,
}

// SAFETY: the arena owns its mapping; slices handed to workers are disjoint
// and the driver enforces the sharing discipline.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Allocate `bytes` on `numa_node`. `bytes` is rounded up to the page
    /// size in use. Fatal to the run on failure: no partial allocation.
    pub fn allocate(
        numa_node: u32,
        bytes: usize,
        use_large_pages: bool,
        numa_enabled: bool,
        topology: &SystemTopology,
    ) -> Result<Self, String> {
        if bytes == 0 {
            return Err("arena size must be non-zero".to_string());
        }

        let (page_size, page_class) = if use_large_pages {
            (topology.large_page_size, PageClass::Large)
        } else {
            (topology.page_size, PageClass::Regular)
        };
        let len = bytes.div_ceil(page_size) * page_size;
        // One slack page past the usable region; reverse kernels touch the
        // word at base + len.
        let raw_len = len + page_size;

        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        #[cfg(target_os = "linux")]
        if use_large_pages {
            flags |= libc::MAP_HUGETLB;
        }

        // Bind to the target node for the duration of allocation + first
        // touch so the pages land node-local.
        let saved = if numa_enabled {
            let node_cpus = topology.cpus_in_node(numa_node);
            let saved = affinity::save_mask();
            if saved.is_none() || !affinity::pin_to_cpus(node_cpus) {
                log::warn!(
                    "could not bind to NUMA node {numa_node} for allocation; \
                     falling back to UMA placement"
                );
                None
            } else {
                saved
            }
        } else {
            None
        };
        let numa_local = saved.is_some();

        // SAFETY: anonymous private mapping with no backing fd.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                raw_len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            if let Some(mask) = &saved {
                affinity::restore_mask(mask);
            }
            let hint = if use_large_pages {
                " (are enough huge pages reserved and is the process privileged to lock them?)"
            } else {
                ""
            };
            return Err(format!(
                "failed to allocate {raw_len} B on NUMA node {numa_node}{hint}"
            ));
        }
        let raw = raw as *mut u8;

        // mmap returns page-aligned addresses, but keep the upward alignment
        // explicit so the invariant does not depend on it.
        let mask = page_size - 1;
        let base = ((raw as usize + mask) & !mask) as *mut u8;

        let arena = Self {
            raw,
            raw_len,
            base,
            len,
            numa_node,
            page_class,
            numa_local,
        };
        arena.prime();

        if let Some(mask) = &saved {
            affinity::restore_mask(mask);
        }

        Ok(arena)
    }

    /// Touch every byte with a forward sequential write so all pages are
    /// faulted in and physically resident before any timed section runs.
    fn prime(&self) {
        let mut p = self.base;
        // SAFETY: [base, base + len) is inside the mapping; volatile stores
        // cannot be elided.
        unsafe {
            let end = self.base.add(self.len);
            while p < end {
                ptr::write_volatile(p as *mut u64, 0);
                p = p.add(std::mem::size_of::<u64>());
            }
        }
    }

    /// Start of the usable, aligned region.
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Usable length in bytes (multiple of the page size).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn numa_node(&self) -> u32 {
        self.numa_node
    }

    pub fn page_class(&self) -> PageClass {
        self.page_class
    }

    /// Whether the first touch ran with the thread bound to the target node.
    /// `false` means UMA fallback; surfaced as a run warning.
    pub fn numa_local(&self) -> bool {
        self.numa_local
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: raw/raw_len describe exactly the mapping created in allocate.
        unsafe {
            libc::munmap(self.raw as *mut libc::c_void, self.raw_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo() -> SystemTopology {
        SystemTopology::probe()
    }

    #[test]
    fn allocation_is_page_aligned_and_rounded() {
        let topology = topo();
        let arena = Arena::allocate(0, 5000, false, false, &topology).unwrap();
        assert_eq!(arena.base() as usize % topology.page_size, 0);
        assert_eq!(arena.len() % topology.page_size, 0);
        assert!(arena.len() >= 5000);
        assert_eq!(arena.page_class(), PageClass::Regular);
    }

    #[test]
    fn base_alignment_covers_widest_access() {
        let topology = topo();
        let arena = Arena::allocate(0, 4096, false, false, &topology).unwrap();
        assert_eq!(arena.base() as usize % 32, 0);
    }

    #[test]
    fn zero_bytes_is_an_error() {
        let topology = topo();
        assert!(Arena::allocate(0, 0, false, false, &topology).is_err());
    }

    #[test]
    fn region_is_writable_and_readable_after_priming() {
        let topology = topo();
        let arena = Arena::allocate(0, 8192, false, false, &topology).unwrap();
        // SAFETY: in-bounds accesses of the arena's own region.
        unsafe {
            let words = arena.len() / 8;
            let base = arena.base() as *mut u64;
            for i in 0..words {
                ptr::write_volatile(base.add(i), i as u64);
            }
            assert_eq!(ptr::read_volatile(base), 0);
            assert_eq!(ptr::read_volatile(base.add(words - 1)), words as u64 - 1);
        }
    }

    #[test]
    fn tail_slack_is_readable() {
        let topology = topo();
        let arena = Arena::allocate(0, 4096, false, false, &topology).unwrap();
        // Reverse kernels read one word at base + len; the mapping keeps a
        // slack page there.
        // SAFETY: the slack page is part of the raw mapping.
        unsafe {
            let past_end = arena.base().add(arena.len()) as *const u64;
            let _ = ptr::read_volatile(past_end);
        }
    }

    #[test]
    fn numa_first_touch_runs_when_enabled() {
        let topology = topo();
        let arena = Arena::allocate(0, 4096, false, true, &topology);
        // Pinning may be denied in constrained environments; the allocation
        // itself must still succeed with the fallback flag set accordingly.
        let arena = arena.unwrap();
        let _ = arena.numa_local();
    }

    #[test]
    #[ignore] // Hardware-dependent: requires reserved huge pages
    fn large_page_allocation() {
        let topology = topo();
        let arena = Arena::allocate(0, topology.large_page_size, true, false, &topology).unwrap();
        assert_eq!(arena.page_class(), PageClass::Large);
        assert_eq!(arena.base() as usize % topology.large_page_size, 0);
    }
}
