//! System-wide constants shared by all orbit crates.

use std::time::Duration;

/// Default control loop frequency [Hz].
pub const DEFAULT_LOOP_FREQUENCY_HZ: f64 = 1000.0;

/// Lowest loop frequency the governor or operator may select [Hz].
pub const MIN_LOOP_FREQUENCY_HZ: f64 = 10.0;

/// Highest loop frequency the governor or operator may select [Hz].
pub const MAX_LOOP_FREQUENCY_HZ: f64 = 2000.0;

/// Default cycle time in microseconds (1 ms = 1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1_000;

/// Default cycle time as a `Duration`.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64);

/// Default steering magnet current limits [A].
pub const DEFAULT_MAGNET_MIN_A: f64 = -2.0;
/// See [`DEFAULT_MAGNET_MIN_A`].
pub const DEFAULT_MAGNET_MAX_A: f64 = 2.0;

/// Closed-loop coupling gain: beam offset injected per ampere of
/// steering current each cycle [mm/A].
pub const DEFAULT_COUPLING_GAIN: f64 = 0.4;

/// Watchdog warning threshold as a fraction of the cycle budget.
pub const WATCHDOG_WARNING_RATIO: f64 = 0.8;

/// Consecutive deadline misses before the critical callback fires.
pub const WATCHDOG_CRITICAL_CONSECUTIVE: u32 = 5;

/// Consecutive warning-level cycles before the warning callback fires.
pub const WATCHDOG_WARNING_CONSECUTIVE: u32 = 10;

/// Cumulative deadline misses between automatic frequency reductions.
pub const FREQUENCY_REDUCTION_MISS_INTERVAL: u64 = 10;

/// Factor applied to the loop frequency on automatic reduction.
pub const FREQUENCY_REDUCTION_FACTOR: f64 = 0.8;

/// Sensor health predicate: minimum read success rate [%].
pub const SENSOR_HEALTH_SUCCESS_RATE: f64 = 90.0;

/// Actuator health predicate: minimum command success rate [%].
pub const ACTUATOR_HEALTH_SUCCESS_RATE: f64 = 95.0;

/// Per-cycle command receive timeout.
pub const COMMAND_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Default telemetry history depth [samples].
pub const TELEMETRY_HISTORY_DEPTH: usize = 4096;

/// Convert a loop frequency [Hz] to the cycle period.
#[inline]
pub fn period_from_frequency(hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / hz)
}
