//! Thread placement helpers: CPU pinning and scheduling priority.
//!
//! Failures here are never fatal. Callers log a warning and continue with
//! weaker locality or priority guarantees.

/// Saved CPU mask of the calling thread, restorable with [`restore_mask`].
#[cfg(target_os = "linux")]
pub struct AffinityMask(libc::cpu_set_t);

#[cfg(not(target_os = "linux"))]
pub struct AffinityMask(());

/// Capture the calling thread's current CPU mask.
#[cfg(target_os = "linux")]
pub fn save_mask() -> Option<AffinityMask> {
    // SAFETY: zeroed cpu_set_t is a valid empty set; sched_getaffinity fills it.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) == 0 {
            Some(AffinityMask(set))
        } else {
            None
        }
    }
}

/// Restore a mask captured by [`save_mask`].
#[cfg(target_os = "linux")]
pub fn restore_mask(mask: &AffinityMask) -> bool {
    // SAFETY: the mask came from sched_getaffinity on this process.
    unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mask.0) == 0 }
}

/// Bind the calling thread to a single logical CPU.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu_id: u32) -> bool {
    pin_to_cpus(&[cpu_id])
}

/// Bind the calling thread to a set of logical CPUs.
#[cfg(target_os = "linux")]
pub fn pin_to_cpus(cpus: &[u32]) -> bool {
    if cpus.is_empty() {
        return false;
    }
    // SAFETY: CPU_ZERO/CPU_SET only write into the local set.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for &cpu in cpus {
            libc::CPU_SET(cpu as usize, &mut set);
        }
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0
    }
}

/// Clear the calling thread's pinning back to every online CPU.
#[cfg(target_os = "linux")]
pub fn unpin() -> bool {
    // SAFETY: sysconf is always safe; CPU_SET writes into the local set.
    unsafe {
        let total = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
        if total <= 0 {
            return false;
        }
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in 0..total as usize {
            libc::CPU_SET(cpu, &mut set);
        }
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0
    }
}

#[cfg(not(target_os = "linux"))]
pub fn save_mask() -> Option<AffinityMask> {
    None
}

#[cfg(not(target_os = "linux"))]
pub fn restore_mask(_mask: &AffinityMask) -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu_id: u32) -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpus(_cpus: &[u32]) -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn unpin() -> bool {
    false
}

/// Nice value applied to measurement threads while they run.
#[cfg(target_os = "linux")]
const BOOSTED_NICE: libc::c_int = -20;

/// Raise the calling thread's scheduling priority. Returns the previous nice
/// value on success so it can be restored. Usually requires elevated
/// privileges.
#[cfg(target_os = "linux")]
pub fn boost_priority() -> Option<i32> {
    // SAFETY: getpriority/setpriority on the calling thread id.
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        // getpriority can legitimately return -1; clear errno to distinguish.
        *libc::__errno_location() = 0;
        let prev = libc::getpriority(libc::PRIO_PROCESS, tid);
        if prev == -1 && *libc::__errno_location() != 0 {
            return None;
        }
        if libc::setpriority(libc::PRIO_PROCESS, tid, BOOSTED_NICE) == 0 {
            Some(prev)
        } else {
            None
        }
    }
}

/// Restore a nice value previously returned by [`boost_priority`].
#[cfg(target_os = "linux")]
pub fn restore_priority(previous: i32) -> bool {
    // SAFETY: setpriority on the calling thread id.
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, previous) == 0
    }
}

#[cfg(not(target_os = "linux"))]
pub fn boost_priority() -> Option<i32> {
    None
}

#[cfg(not(target_os = "linux"))]
pub fn restore_priority(_previous: i32) -> bool {
    false
}
