//! Beam Loss Monitor: per-monitor threshold logic.
//!
//! Each BLM computes a simulated loss rate from the beam conditions and
//! compares it against warning and abort thresholds. Threshold crossings
//! fire their callback once per entry; dropping back below the threshold
//! clears the corresponding latch. Callbacks execute on the loop thread
//! and must not block, allocate or perform I/O.

use orbit_common::atomic::AtomicF64;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Background loss-rate scale of the simulated detector [Gy/s].
const BASE_LOSS_RATE: f64 = 1e-6;

/// Default warning threshold [Gy/s].
pub const DEFAULT_WARNING_THRESHOLD: f64 = 1e-6;
/// Default beam-abort threshold [Gy/s].
pub const DEFAULT_ABORT_THRESHOLD: f64 = 1e-5;

/// Callback receiving the monitor id and the offending loss rate.
pub type BlmCallback = Box<dyn Fn(&str, f64) + Send>;

/// Counter snapshot of one monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlmStatistics {
    /// Measurements taken.
    pub total_measurements: u64,
    /// Warning-threshold entries.
    pub warning_count: u64,
    /// Abort-threshold entries.
    pub abort_count: u64,
    /// Most recent loss rate [Gy/s].
    pub loss_rate: f64,
    /// Warning latch state.
    pub warning_active: bool,
    /// Abort latch state.
    pub abort_active: bool,
}

/// Radiation monitor adjacent to the beamline.
pub struct BeamLossMonitor {
    id: String,
    loss_rate: AtomicF64,
    warning_threshold: AtomicF64,
    abort_threshold: AtomicF64,
    warning_active: AtomicBool,
    abort_active: AtomicBool,

    total_measurements: AtomicU64,
    warning_count: AtomicU64,
    abort_count: AtomicU64,

    warning_callback: Option<BlmCallback>,
    abort_callback: Option<BlmCallback>,
}

impl BeamLossMonitor {
    /// Construct a monitor with default thresholds.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            loss_rate: AtomicF64::new(0.0),
            warning_threshold: AtomicF64::new(DEFAULT_WARNING_THRESHOLD),
            abort_threshold: AtomicF64::new(DEFAULT_ABORT_THRESHOLD),
            warning_active: AtomicBool::new(false),
            abort_active: AtomicBool::new(false),
            total_measurements: AtomicU64::new(0),
            warning_count: AtomicU64::new(0),
            abort_count: AtomicU64::new(0),
            warning_callback: None,
            abort_callback: None,
        }
    }

    /// Fold in one measurement of the beam conditions.
    ///
    /// The simulated loss rate grows with beam current and with distance
    /// off axis: `L = L₀ · (1 + 0.1·|position|) · (current / 1000)`.
    ///
    /// Returns false while the loss rate exceeds the abort threshold.
    pub fn update_measurement(&self, beam_current: f64, beam_position: f64) -> bool {
        self.total_measurements.fetch_add(1, Ordering::Relaxed);

        let position_factor = 1.0 + beam_position.abs() * 0.1;
        let current_factor = beam_current / 1000.0;
        let loss = BASE_LOSS_RATE * position_factor * current_factor;
        self.loss_rate.store(loss, Ordering::Relaxed);

        let warning_exceeded = loss > self.warning_threshold.load(Ordering::Relaxed);
        let abort_exceeded = loss > self.abort_threshold.load(Ordering::Relaxed);

        if abort_exceeded && !self.abort_active.load(Ordering::Relaxed) {
            self.abort_active.store(true, Ordering::Relaxed);
            self.abort_count.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = &self.abort_callback {
                cb(&self.id, loss);
            }
        }

        if warning_exceeded && !self.warning_active.load(Ordering::Relaxed) {
            self.warning_active.store(true, Ordering::Relaxed);
            self.warning_count.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = &self.warning_callback {
                cb(&self.id, loss);
            }
        }

        // Falling below a threshold clears its latch.
        if !warning_exceeded {
            self.warning_active.store(false, Ordering::Relaxed);
        }
        if !abort_exceeded {
            self.abort_active.store(false, Ordering::Relaxed);
        }

        !abort_exceeded
    }

    /// Set the warning threshold [Gy/s].
    pub fn set_warning_threshold(&self, threshold: f64) {
        self.warning_threshold.store(threshold, Ordering::Relaxed);
    }

    /// Set the abort threshold [Gy/s].
    pub fn set_abort_threshold(&self, threshold: f64) {
        self.abort_threshold.store(threshold, Ordering::Relaxed);
    }

    /// Install the warning-crossing callback.
    pub fn set_warning_callback(&mut self, callback: BlmCallback) {
        self.warning_callback = Some(callback);
    }

    /// Install the abort-crossing callback.
    pub fn set_abort_callback(&mut self, callback: BlmCallback) {
        self.abort_callback = Some(callback);
    }

    /// Most recent loss rate [Gy/s].
    pub fn loss_rate(&self) -> f64 {
        self.loss_rate.load(Ordering::Relaxed)
    }

    /// Warning latch state.
    pub fn is_warning_active(&self) -> bool {
        self.warning_active.load(Ordering::Relaxed)
    }

    /// Abort latch state.
    pub fn is_abort_active(&self) -> bool {
        self.abort_active.load(Ordering::Relaxed)
    }

    /// Monitor identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Counter snapshot.
    pub fn statistics(&self) -> BlmStatistics {
        BlmStatistics {
            total_measurements: self.total_measurements.load(Ordering::Relaxed),
            warning_count: self.warning_count.load(Ordering::Relaxed),
            abort_count: self.abort_count.load(Ordering::Relaxed),
            loss_rate: self.loss_rate.load(Ordering::Relaxed),
            warning_active: self.warning_active.load(Ordering::Relaxed),
            abort_active: self.abort_active.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters and clear the latches.
    pub fn reset_statistics(&self) {
        self.total_measurements.store(0, Ordering::Relaxed);
        self.warning_count.store(0, Ordering::Relaxed);
        self.abort_count.store(0, Ordering::Relaxed);
        self.warning_active.store(false, Ordering::Relaxed);
        self.abort_active.store(false, Ordering::Relaxed);
    }
}
