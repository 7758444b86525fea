//! Optional real-time process setup and wake-up jitter tracking.
//!
//! The setup sequence locks memory, prefaults the stack, pins the loop
//! thread to a core and elevates it to `SCHED_FIFO`. All of it is
//! advisory: without the `rt` cargo feature every call is a no-op, and
//! loop correctness never depends on it.

use std::time::Duration;
use thiserror::Error;

/// Failure during real-time setup.
#[derive(Debug, Error)]
pub enum RtError {
    /// An RT system call failed.
    #[error("RT setup error: {0}")]
    Setup(String),
}

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtError> {
    use nix::sys::mman::{mlockall, MlockAllFlags};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| RtError::Setup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages to prevent page faults during RT execution.
fn prefault_stack() {
    // Touch 1 MB of stack to force page allocation.
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RtError::Setup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RtError::Setup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Set `SCHED_FIFO` with the given RT priority.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RtError::Setup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence.
///
/// Call once before entering the cycle loop. In simulation mode (no `rt`
/// feature) every step succeeds as a no-op.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

/// Bounded window for jitter percentile analysis [samples].
const JITTER_WINDOW: usize = 10_000;

/// Wake-up jitter statistics with percentile analysis over a bounded
/// sample window.
#[derive(Debug, Default)]
pub struct JitterStats {
    samples: u64,
    min_us: f64,
    max_us: f64,
    sum_us: f64,
    window: Vec<f64>,
}

/// Summary of the jitter distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterReport {
    /// Samples recorded.
    pub samples: u64,
    /// Minimum jitter [µs].
    pub min_us: f64,
    /// Maximum jitter [µs].
    pub max_us: f64,
    /// Mean jitter [µs].
    pub mean_us: f64,
    /// 95th percentile [µs].
    pub p95_us: f64,
    /// 99th percentile [µs].
    pub p99_us: f64,
}

impl JitterStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self {
            min_us: f64::MAX,
            window: Vec::with_capacity(JITTER_WINDOW),
            ..Self::default()
        }
    }

    /// Record one wake-up jitter observation.
    pub fn record(&mut self, jitter: Duration) {
        let us = jitter.as_secs_f64() * 1e6;
        self.samples += 1;
        self.sum_us += us;
        if us < self.min_us {
            self.min_us = us;
        }
        if us > self.max_us {
            self.max_us = us;
        }
        if self.window.len() < JITTER_WINDOW {
            self.window.push(us);
        }
    }

    /// Jitter at the given percentile (0–100) over the sample window.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted = self.window.clone();
        sorted.sort_by(f64::total_cmp);
        let rank = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }

    /// Distribution summary.
    pub fn report(&self) -> JitterReport {
        JitterReport {
            samples: self.samples,
            min_us: if self.samples == 0 { 0.0 } else { self.min_us },
            max_us: self.max_us,
            mean_us: if self.samples == 0 {
                0.0
            } else {
                self.sum_us / self.samples as f64
            },
            p95_us: self.percentile(95.0),
            p99_us: self.percentile(99.0),
        }
    }

    /// Discard all recorded samples.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
