//! System topology probing: NUMA nodes, logical CPUs, page sizes.
//!
//! On Linux the probe walks sysfs (`/sys/devices/system/node`,
//! `/sys/devices/system/cpu`) and `/proc/meminfo`. Anything that cannot be
//! read degrades to a single UMA node spanning every logical CPU with default
//! page sizes, so the probe itself never fails.

use std::collections::HashSet;
use std::path::Path;

/// Failsafe page size when the OS cannot be queried.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;
/// Failsafe large page size when the OS cannot be queried.
pub const DEFAULT_LARGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// A one-time snapshot of the machine layout relevant to placement decisions.
#[derive(Debug, Clone)]
pub struct SystemTopology {
    pub num_numa_nodes: u32,
    pub num_physical_packages: u32,
    pub num_physical_cores: u32,
    pub num_logical_cpus: u32,
    pub page_size: usize,
    pub large_page_size: usize,
    node_cpus: Vec<Vec<u32>>,
}

impl SystemTopology {
    /// Probe the current machine. Called once at startup.
    pub fn probe() -> Self {
        let num_logical_cpus = logical_cpu_count();
        let page_size = query_page_size().unwrap_or(DEFAULT_PAGE_SIZE);
        let large_page_size = query_large_page_size().unwrap_or(DEFAULT_LARGE_PAGE_SIZE);

        let node_cpus = probe_numa_nodes().unwrap_or_else(|| {
            // UMA fallback: one node owning every logical CPU.
            vec![(0..num_logical_cpus).collect()]
        });

        let (num_physical_packages, num_physical_cores) =
            probe_core_layout().unwrap_or((1, num_logical_cpus));

        Self {
            num_numa_nodes: node_cpus.len() as u32,
            num_physical_packages,
            num_physical_cores,
            num_logical_cpus,
            page_size,
            large_page_size,
            node_cpus,
        }
    }

    /// The `rank`-th logical CPU in `node`, if both exist.
    pub fn cpu_in_node(&self, node: u32, rank: u32) -> Option<u32> {
        self.node_cpus
            .get(node as usize)
            .and_then(|cpus| cpus.get(rank as usize))
            .copied()
    }

    /// All logical CPUs of `node` (empty for an unknown node).
    pub fn cpus_in_node(&self, node: u32) -> &[u32] {
        self.node_cpus
            .get(node as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn logical_cpu_count() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is always safe to call.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n > 0 {
            return n as u32;
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

fn query_page_size() -> Option<usize> {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is always safe to call.
        let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if sz > 0 {
            return Some(sz as usize);
        }
    }
    None
}

fn query_large_page_size() -> Option<usize> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("Hugepagesize:") {
            let kb: usize = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Per-node CPU lists from sysfs, or `None` when the node directory is
/// missing (non-Linux, or NUMA-less kernel).
fn probe_numa_nodes() -> Option<Vec<Vec<u32>>> {
    let node_root = Path::new("/sys/devices/system/node");
    let entries = std::fs::read_dir(node_root).ok()?;

    let mut nodes: Vec<(u32, Vec<u32>)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(idx) = name.strip_prefix("node").and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let cpulist = std::fs::read_to_string(entry.path().join("cpulist")).ok()?;
        nodes.push((idx, parse_cpulist(&cpulist)));
    }

    if nodes.is_empty() {
        return None;
    }
    nodes.sort_by_key(|(idx, _)| *idx);
    Some(nodes.into_iter().map(|(_, cpus)| cpus).collect())
}

/// (packages, physical cores) from per-CPU topology files.
fn probe_core_layout() -> Option<(u32, u32)> {
    let cpu_root = Path::new("/sys/devices/system/cpu");
    let entries = std::fs::read_dir(cpu_root).ok()?;

    let mut packages: HashSet<u32> = HashSet::new();
    let mut cores: HashSet<(u32, u32)> = HashSet::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name
            .strip_prefix("cpu")
            .and_then(|s| s.parse::<u32>().ok())
            .is_none()
        {
            continue;
        }
        let topo = entry.path().join("topology");
        let pkg: u32 = std::fs::read_to_string(topo.join("physical_package_id"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        let core: u32 = std::fs::read_to_string(topo.join("core_id"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        packages.insert(pkg);
        cores.insert((pkg, core));
    }

    if packages.is_empty() {
        return None;
    }
    Some((packages.len() as u32, cores.len() as u32))
}

/// Parse a kernel cpulist string such as `"0-3,8,10-11"`.
fn parse_cpulist(list: &str) -> Vec<u32> {
    let mut cpus = Vec::new();
    for part in list.trim().split(',') {
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                    cpus.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(cpu) = part.trim().parse::<u32>() {
                    cpus.push(cpu);
                }
            }
        }
    }
    cpus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpulist_ranges_and_singles() {
        assert_eq!(parse_cpulist("0-3,8,10-11"), vec![0, 1, 2, 3, 8, 10, 11]);
        assert_eq!(parse_cpulist("5"), vec![5]);
        assert_eq!(parse_cpulist("0-1\n"), vec![0, 1]);
        assert!(parse_cpulist("").is_empty());
    }

    #[test]
    fn probe_reports_at_least_one_of_everything() {
        let topo = SystemTopology::probe();
        assert!(topo.num_numa_nodes >= 1);
        assert!(topo.num_logical_cpus >= 1);
        assert!(topo.num_physical_packages >= 1);
        assert!(topo.page_size >= 512);
        assert!(topo.large_page_size >= topo.page_size);
    }

    #[test]
    fn cpu_in_node_bounds() {
        let topo = SystemTopology::probe();
        assert!(topo.cpu_in_node(0, 0).is_some());
        assert!(topo.cpu_in_node(topo.num_numa_nodes, 0).is_none());
        assert!(topo.cpu_in_node(0, topo.num_logical_cpus).is_none());
    }

    #[test]
    fn node_zero_has_cpus() {
        let topo = SystemTopology::probe();
        assert!(!topo.cpus_in_node(0).is_empty());
        assert!(topo.cpus_in_node(topo.num_numa_nodes).is_empty());
    }
}
