//! Per-cycle telemetry sample and aggregate statistics.
//!
//! [`TelemetrySample`] is the standard record produced once per control
//! cycle and consumed by the publisher, the history ring and the operator
//! interfaces. Designed for 1 kHz production with no allocation.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::time::Instant;

bitflags! {
    /// Compact health word derived from a telemetry sample.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HealthFlags: u8 {
        /// The cycle exceeded its watchdog budget.
        const DEADLINE_MISS        = 0x01;
        /// The control output hit the magnet current limits.
        const MAGNET_SATURATED     = 0x02;
        /// The PID integrator is pinned at a bound.
        const INTEGRATOR_SATURATED = 0x04;
    }
}

impl Default for HealthFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// One control-cycle telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TelemetrySample {
    /// Timestamp in seconds since control loop start (monotonic clock).
    pub t_sec: f64,
    /// Control loop cycle counter.
    pub cycle: u64,

    /// Beam position [mm] (from BPM).
    pub pos: f64,
    /// Beam intensity [counts/s] (from BIC).
    pub intensity: f64,

    /// Magnet current [A].
    pub magnet_current: f64,
    /// Position setpoint [mm].
    pub setpoint: f64,

    /// Position error (setpoint − measurement) [mm].
    pub error: f64,
    /// Proportional term contribution.
    pub pid_p: f64,
    /// Integral term contribution.
    pub pid_i: f64,
    /// Derivative term contribution.
    pub pid_d: f64,
    /// Total PID output before limiting.
    pub control_output: f64,

    /// True if the control loop missed its timing deadline.
    pub deadline_miss: bool,
    /// True if the magnet output is at its limits.
    pub magnet_saturated: bool,
    /// True if the PID integrator is at its limits.
    pub integrator_saturated: bool,

    /// Control loop execution time [µs].
    pub loop_time_us: u32,
    /// CPU usage estimate (0.0–1.0), execution time over period.
    pub cpu_usage: f64,
}

impl TelemetrySample {
    /// Seconds elapsed since `start` on the monotonic clock.
    #[inline]
    pub fn timestamp_since(start: Instant) -> f64 {
        start.elapsed().as_secs_f64()
    }

    /// True if no error conditions are present.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        !self.deadline_miss && !self.magnet_saturated && !self.integrator_saturated
    }

    /// Health word for compact status reporting.
    pub fn health_flags(&self) -> HealthFlags {
        let mut flags = HealthFlags::empty();
        flags.set(HealthFlags::DEADLINE_MISS, self.deadline_miss);
        flags.set(HealthFlags::MAGNET_SATURATED, self.magnet_saturated);
        flags.set(HealthFlags::INTEGRATOR_SATURATED, self.integrator_saturated);
        flags
    }

    /// Sum of the P, I and D contributions.
    #[inline]
    pub fn pid_total(&self) -> f64 {
        self.pid_p + self.pid_i + self.pid_d
    }

    /// True if `|error| <= tolerance`.
    #[inline]
    pub fn position_in_tolerance(&self, tolerance: f64) -> bool {
        self.error.abs() <= tolerance
    }
}

/// Accumulated telemetry statistics over an observation window.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    /// Number of accumulated samples.
    pub sample_count: u64,

    /// Position running mean [mm].
    pub pos_mean: f64,
    /// Position running sum of squared deviations (Welford).
    pos_m2: f64,
    /// Minimum observed position [mm].
    pub pos_min: f64,
    /// Maximum observed position [mm].
    pub pos_max: f64,

    /// Error mean [mm].
    pub error_mean: f64,
    /// Sum of squared errors for RMS.
    error_sq_sum: f64,
    /// Largest absolute error observed [mm].
    pub max_error: f64,

    /// Mean loop execution time [µs].
    pub mean_loop_time_us: f64,
    /// Maximum loop execution time [µs].
    pub max_loop_time_us: f64,
    /// Cumulative deadline misses.
    pub deadline_miss_count: u64,

    /// Mean CPU usage estimate.
    pub mean_cpu_usage: f64,
    /// Peak CPU usage estimate.
    pub max_cpu_usage: f64,
    /// Cycles where the magnet or integrator saturated.
    pub saturation_events: u64,
}

impl TelemetryStats {
    /// Create an empty statistics window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample into the window.
    pub fn accumulate(&mut self, s: &TelemetrySample) {
        let n0 = self.sample_count as f64;
        self.sample_count += 1;
        let n1 = self.sample_count as f64;

        // Welford update for the position mean/variance.
        let delta = s.pos - self.pos_mean;
        self.pos_mean += delta / n1;
        self.pos_m2 += delta * (s.pos - self.pos_mean);

        if self.sample_count == 1 {
            self.pos_min = s.pos;
            self.pos_max = s.pos;
        } else {
            self.pos_min = self.pos_min.min(s.pos);
            self.pos_max = self.pos_max.max(s.pos);
        }

        self.error_mean = (self.error_mean * n0 + s.error) / n1;
        self.error_sq_sum += s.error * s.error;
        self.max_error = self.max_error.max(s.error.abs());

        let lt = s.loop_time_us as f64;
        self.mean_loop_time_us = (self.mean_loop_time_us * n0 + lt) / n1;
        self.max_loop_time_us = self.max_loop_time_us.max(lt);
        if s.deadline_miss {
            self.deadline_miss_count += 1;
        }

        self.mean_cpu_usage = (self.mean_cpu_usage * n0 + s.cpu_usage) / n1;
        self.max_cpu_usage = self.max_cpu_usage.max(s.cpu_usage);
        if s.magnet_saturated || s.integrator_saturated {
            self.saturation_events += 1;
        }
    }

    /// Position standard deviation over the window [mm].
    pub fn pos_std(&self) -> f64 {
        if self.sample_count < 2 {
            return 0.0;
        }
        (self.pos_m2 / (self.sample_count as f64 - 1.0)).sqrt()
    }

    /// RMS position error over the window [mm].
    pub fn error_rms(&self) -> f64 {
        if self.sample_count == 0 {
            return 0.0;
        }
        (self.error_sq_sum / self.sample_count as f64).sqrt()
    }

    /// Deadline-miss rate over the window (0.0–1.0).
    pub fn deadline_miss_rate(&self) -> f64 {
        if self.sample_count == 0 {
            return 0.0;
        }
        self.deadline_miss_count as f64 / self.sample_count as f64
    }

    /// Reset the window.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True if all metrics are within acceptable operational ranges.
    pub fn is_healthy(&self) -> bool {
        self.deadline_miss_rate() < 0.01
            && self.max_loop_time_us < 500.0
            && self.max_cpu_usage < 0.8
    }
}
