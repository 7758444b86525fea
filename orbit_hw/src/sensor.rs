//! Sensor contract: polymorphic readout with metadata, statistics and
//! health diagnostics.
//!
//! Designed for high-frequency polling (1 kHz+). [`Sensor::read`] is the
//! fallible hot path; [`Sensor::read_with_metadata`] never fails — errors
//! surface inside the returned [`Reading`]. Statistics live in atomic
//! cells so observer threads can sample them without locks.

use crate::error::SensorError;
use orbit_common::atomic::AtomicF64;
use orbit_common::consts::SENSOR_HEALTH_SUCCESS_RATE;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A sensor reading with acquisition metadata.
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    /// Measured value in the sensor's units.
    pub value: f64,
    /// When the reading was taken (monotonic clock).
    pub timestamp: Instant,
    /// Failure classification; `None` means the read succeeded.
    pub error: Option<SensorError>,
    /// Reading validity flag (`error.is_none()` implies valid).
    pub valid: bool,
    /// Reading quality in `[0, 1]`.
    pub quality: f64,
}

impl Reading {
    /// A successful reading at full quality.
    pub fn ok(value: f64) -> Self {
        Self {
            value,
            timestamp: Instant::now(),
            error: None,
            valid: true,
            quality: 1.0,
        }
    }

    /// A failed reading carrying its error classification.
    pub fn failed(error: SensorError) -> Self {
        Self {
            value: 0.0,
            timestamp: Instant::now(),
            error: Some(error),
            valid: false,
            quality: 0.0,
        }
    }

    /// Age of the reading on the monotonic clock.
    #[inline]
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// True if the reading is valid and no older than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.valid && self.error.is_none() && self.age() <= max_age
    }
}

/// Accumulating sensor performance statistics.
///
/// All fields are atomic: the loop thread updates with relaxed stores,
/// observer threads read concurrently. Min/max go through CAS loops.
#[derive(Debug, Default)]
pub struct SensorStats {
    total_reads: AtomicU64,
    successful_reads: AtomicU64,
    error_count: AtomicU64,
    timeout_count: AtomicU64,
    sum_read_ns: AtomicU64,
    min_read_us: AtomicF64,
    max_read_us: AtomicF64,
}

impl SensorStats {
    /// Fresh statistics block.
    pub fn new() -> Self {
        let s = Self::default();
        s.min_read_us.store(f64::MAX, Ordering::Relaxed);
        s
    }

    /// Record a successful read and its duration.
    pub fn record_success(&self, elapsed: Duration) {
        self.total_reads.fetch_add(1, Ordering::Relaxed);
        self.successful_reads.fetch_add(1, Ordering::Relaxed);

        self.sum_read_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);

        let us = elapsed.as_secs_f64() * 1e6;
        self.min_read_us.fetch_min(us);
        self.max_read_us.fetch_max(us);
    }

    /// Record a failed read with its classification.
    pub fn record_error(&self, error: SensorError) {
        self.total_reads.fetch_add(1, Ordering::Relaxed);
        self.error_count.fetch_add(1, Ordering::Relaxed);
        if error == SensorError::Timeout {
            self.timeout_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total reads performed.
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::Relaxed)
    }

    /// Successful reads.
    pub fn successful_reads(&self) -> u64 {
        self.successful_reads.load(Ordering::Relaxed)
    }

    /// Total errors.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Timeout errors.
    pub fn timeout_count(&self) -> u64 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    /// Success rate [%]; 100 when no reads have been performed.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_reads();
        if total == 0 {
            return 100.0;
        }
        self.successful_reads() as f64 / total as f64 * 100.0
    }

    /// Mean read time over successful reads [µs].
    pub fn mean_read_time_us(&self) -> f64 {
        let successful = self.successful_reads();
        if successful == 0 {
            return 0.0;
        }
        self.sum_read_ns.load(Ordering::Relaxed) as f64 / successful as f64 / 1e3
    }

    /// Minimum observed read time [µs]; 0 when no reads yet.
    pub fn min_read_time_us(&self) -> f64 {
        let v = self.min_read_us.load(Ordering::Relaxed);
        if v == f64::MAX {
            0.0
        } else {
            v
        }
    }

    /// Maximum observed read time [µs].
    pub fn max_read_time_us(&self) -> f64 {
        self.max_read_us.load(Ordering::Relaxed)
    }

    /// Zero all counters and timing statistics.
    pub fn reset(&self) {
        self.total_reads.store(0, Ordering::Relaxed);
        self.successful_reads.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.timeout_count.store(0, Ordering::Relaxed);
        self.sum_read_ns.store(0, Ordering::Relaxed);
        self.min_read_us.store(f64::MAX, Ordering::Relaxed);
        self.max_read_us.store(0.0, Ordering::Relaxed);
    }
}

/// Contract for all sensor types in the control system.
///
/// Implementations record their last error inside [`Sensor::read`]; the
/// provided [`Sensor::read_with_metadata`] handles statistics and wraps
/// failures into the returned [`Reading`].
pub trait Sensor {
    /// Read the current value. The fallible hot path.
    fn read(&mut self) -> Result<f64, SensorError>;

    /// Initialize the sensor hardware. Resets statistics and timestamps.
    fn initialize(&mut self) -> Result<(), SensorError>;

    /// Shut down the sensor and release resources.
    fn shutdown(&mut self);

    /// Run a device-specific self test.
    fn self_test(&mut self) -> bool;

    /// Unique sensor identifier.
    fn id(&self) -> &str;

    /// Sensor type name for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Measurement units (e.g. "mm", "counts/s").
    fn units(&self) -> &'static str;

    /// Valid measurement range as `(min, max)`.
    fn range(&self) -> (f64, f64);

    /// Smallest measurable change.
    fn resolution(&self) -> f64;

    /// True once `initialize` has succeeded.
    fn is_initialized(&self) -> bool;

    /// Classification of the most recent failure, if any.
    fn last_error(&self) -> Option<SensorError>;

    /// Accumulating performance statistics.
    fn stats(&self) -> &SensorStats;

    /// Read with full metadata. Never fails — errors surface inside the
    /// returned [`Reading`].
    fn read_with_metadata(&mut self) -> Reading {
        let start = Instant::now();
        match self.read() {
            Ok(value) => {
                self.stats().record_success(start.elapsed());
                Reading::ok(value)
            }
            Err(e) => {
                self.stats().record_error(e);
                Reading::failed(e)
            }
        }
    }

    /// Reset accumulated statistics.
    fn reset_stats(&self) {
        self.stats().reset();
    }

    /// Health predicate: initialized, no standing error, and success rate
    /// above the sensor threshold.
    fn is_healthy(&self) -> bool {
        self.is_initialized()
            && self.last_error().is_none()
            && self.stats().success_rate() > SENSOR_HEALTH_SUCCESS_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_ok_is_valid() {
        let r = Reading::ok(1.5);
        assert_eq!(r.value, 1.5);
        assert!(r.valid);
        assert!(r.error.is_none());
        assert_eq!(r.quality, 1.0);
        assert!(r.is_fresh(Duration::from_millis(100)));
    }

    #[test]
    fn reading_failed_is_invalid() {
        let r = Reading::failed(SensorError::Communication);
        assert!(!r.valid);
        assert_eq!(r.error, Some(SensorError::Communication));
        assert_eq!(r.quality, 0.0);
        assert!(!r.is_fresh(Duration::from_secs(10)));
    }

    #[test]
    fn stats_success_rate() {
        let stats = SensorStats::new();
        assert_eq!(stats.success_rate(), 100.0);

        for _ in 0..9 {
            stats.record_success(Duration::from_micros(5));
        }
        stats.record_error(SensorError::Timeout);

        assert_eq!(stats.total_reads(), 10);
        assert_eq!(stats.successful_reads(), 9);
        assert_eq!(stats.error_count(), 1);
        assert_eq!(stats.timeout_count(), 1);
        assert!((stats.success_rate() - 90.0).abs() < 1e-12);
    }

    #[test]
    fn stats_timing() {
        let stats = SensorStats::new();
        stats.record_success(Duration::from_micros(10));
        stats.record_success(Duration::from_micros(30));

        assert!((stats.mean_read_time_us() - 20.0).abs() < 1e-9);
        assert!((stats.min_read_time_us() - 10.0).abs() < 1e-9);
        assert!((stats.max_read_time_us() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn stats_reset() {
        let stats = SensorStats::new();
        stats.record_success(Duration::from_micros(10));
        stats.record_error(SensorError::HardwareFault);
        stats.reset();

        assert_eq!(stats.total_reads(), 0);
        assert_eq!(stats.success_rate(), 100.0);
        assert_eq!(stats.min_read_time_us(), 0.0);
        assert_eq!(stats.mean_read_time_us(), 0.0);
    }
}
