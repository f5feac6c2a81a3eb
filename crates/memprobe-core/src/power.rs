//! Socket DRAM power sampling over the benchmark's timed sections.
//!
//! One [`PowerReader`] exists per physical package. Between `start()` and
//! `stop()` a sampling thread appends one wattage sample per period under the
//! trace lock and polls a stop flag each period. A machine without a usable
//! counter yields an empty trace: averages and peaks report zero and the run
//! carries on.
//!
//! The Linux backend reads the RAPL energy counters exposed by powercap
//! (`/sys/class/powercap/intel-rapl:<pkg>/energy_uj`) and differentiates
//! them over the sampling period.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::POWER_SAMPLING_PERIOD_SEC;

/// A source of instantaneous power readings for one socket.
pub trait PowerSampler: Send + Sync {
    /// Human-readable name, used in CSV column headers.
    fn name(&self) -> &str;

    /// Whether this sampler can produce readings on this machine.
    fn is_available(&self) -> bool;

    /// Average power in watts since the previous call, or `None` when the
    /// counter could not be read.
    fn read_power_watts(&self) -> Option<f64>;
}

/// RAPL package-domain energy counter, differentiated into watts.
pub struct RaplPowerSampler {
    name: String,
    energy_path: PathBuf,
    max_energy_range_uj: Option<u64>,
    last: Mutex<Option<(Instant, u64)>>,
}

impl RaplPowerSampler {
    fn read_energy_uj(&self) -> Option<u64> {
        fs::read_to_string(&self.energy_path)
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

impl PowerSampler for RaplPowerSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.read_energy_uj().is_some()
    }

    fn read_power_watts(&self) -> Option<f64> {
        let now = Instant::now();
        let energy = self.read_energy_uj()?;
        let mut last = self.last.lock().unwrap();
        let previous = last.replace((now, energy));
        let (prev_time, prev_energy) = previous?;

        let dt = now.duration_since(prev_time).as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        // The counter wraps at max_energy_range_uj; fold one wrap back in.
        let delta_uj = if energy >= prev_energy {
            energy - prev_energy
        } else {
            let range = self.max_energy_range_uj?;
            range - prev_energy + energy
        };
        Some(delta_uj as f64 / 1e6 / dt)
    }
}

/// Discover one RAPL sampler per package, `Socket <i> DRAM`-style names in
/// package order. Sockets without a counter still get a sampler; it just
/// reports unavailable.
pub fn discover_power_samplers(num_packages: u32) -> Vec<Box<dyn PowerSampler>> {
    (0..num_packages)
        .map(|pkg| {
            let dir = PathBuf::from(format!("/sys/class/powercap/intel-rapl:{pkg}"));
            let max_energy_range_uj = fs::read_to_string(dir.join("max_energy_range_uj"))
                .ok()
                .and_then(|s| s.trim().parse().ok());
            Box::new(RaplPowerSampler {
                name: format!("Socket {pkg} DRAM"),
                energy_path: dir.join("energy_uj"),
                max_energy_range_uj,
                last: Mutex::new(None),
            }) as Box<dyn PowerSampler>
        })
        .collect()
}

struct TraceState {
    samples: Vec<f64>,
    average_power: f64,
    peak_power: f64,
}

struct ReaderShared {
    sampler: Box<dyn PowerSampler>,
    trace: Mutex<TraceState>,
    stop: AtomicBool,
}

impl ReaderShared {
    fn append_sample(&self, watts: f64) {
        let mut trace = self.trace.lock().unwrap();
        trace.samples.push(watts);
        trace.average_power = trace.samples.iter().sum::<f64>() / trace.samples.len() as f64;
        if watts > trace.peak_power {
            trace.peak_power = watts;
        }
    }
}

/// Periodic sampling thread wrapper around one [`PowerSampler`].
pub struct PowerReader {
    shared: Arc<ReaderShared>,
    period: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PowerReader {
    pub fn new(sampler: Box<dyn PowerSampler>) -> Self {
        Self {
            shared: Arc::new(ReaderShared {
                sampler,
                trace: Mutex::new(TraceState {
                    samples: Vec::with_capacity(16),
                    average_power: 0.0,
                    peak_power: 0.0,
                }),
                stop: AtomicBool::new(false),
            }),
            period: Duration::from_secs_f64(POWER_SAMPLING_PERIOD_SEC),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> String {
        self.shared.sampler.name().to_string()
    }

    /// Spawn the sampling thread. Missing counters record nothing; the
    /// benchmark still runs.
    pub fn start(&self) -> bool {
        let mut handle = self.handle.lock().unwrap();
        if handle.is_some() {
            return false;
        }
        if !self.shared.sampler.is_available() {
            log::warn!(
                "power counter for {} is unavailable; reporting zeros",
                self.shared.sampler.name()
            );
            return false;
        }

        // Rearm after a previous stop, and seed the differentiating sampler
        // so the first periodic reading covers exactly one period.
        self.shared.stop.store(false, Ordering::Release);
        let _ = self.shared.sampler.read_power_watts();

        let shared = self.shared.clone();
        let period = self.period;
        *handle = Some(std::thread::spawn(move || {
            // Sleep in short slices so a stop request is honored well before
            // the next sampling point.
            let slice = Duration::from_millis(50);
            loop {
                let mut slept = Duration::ZERO;
                while slept < period {
                    if shared.stop.load(Ordering::Acquire) {
                        return;
                    }
                    std::thread::sleep(slice.min(period - slept));
                    slept += slice;
                }
                if let Some(watts) = shared.sampler.read_power_watts() {
                    shared.append_sample(watts);
                }
            }
        }));
        true
    }

    /// Signal the thread and join it. Returns `false` when no thread was
    /// running or the join failed.
    pub fn stop(&self) -> bool {
        self.shared.stop.store(true, Ordering::Release);
        let handle = self.handle.lock().unwrap().take();
        match handle {
            Some(h) => h.join().is_ok(),
            None => false,
        }
    }

    /// Drop all samples and rearm for the next benchmark.
    pub fn clear_and_reset(&self) {
        self.stop();
        let mut trace = self.shared.trace.lock().unwrap();
        trace.samples.clear();
        trace.average_power = 0.0;
        trace.peak_power = 0.0;
        drop(trace);
        self.shared.stop.store(false, Ordering::Release);
    }

    pub fn average_power(&self) -> f64 {
        self.shared.trace.lock().unwrap().average_power
    }

    pub fn peak_power(&self) -> f64 {
        self.shared.trace.lock().unwrap().peak_power
    }

    /// Scale factor from stored sample values to watts.
    pub fn power_units(&self) -> f64 {
        1.0
    }

    pub fn num_samples(&self) -> usize {
        self.shared.trace.lock().unwrap().samples.len()
    }
}
