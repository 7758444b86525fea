//! Actuator contract: checked command path with safety limits, rate
//! limiting and result reporting.
//!
//! [`Actuator::set`] is the fallible device path. [`ActuatorGate`] runs
//! the admission sequence in front of it — initialization, range, then
//! the wall-clock rate check — and the outcome of the whole command is
//! reported in a [`SetResult`].

use crate::error::ActuatorError;
use orbit_common::atomic::AtomicF64;
use orbit_common::consts::ACTUATOR_HEALTH_SUCCESS_RATE;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a checked actuator command.
#[derive(Debug, Clone, Copy)]
pub struct SetResult {
    /// Operation success flag.
    pub success: bool,
    /// Value that was commanded.
    pub commanded_value: f64,
    /// Actual value reported by the device after the command.
    pub actual_value: f64,
    /// Failure classification; `None` on success.
    pub error: Option<ActuatorError>,
    /// When the operation completed (monotonic clock).
    pub timestamp: Instant,
    /// Time taken for the operation [µs].
    pub execution_time_us: f64,
}

impl SetResult {
    /// A successfully executed command.
    pub fn accepted(commanded: f64, actual: f64, execution_time_us: f64) -> Self {
        Self {
            success: true,
            commanded_value: commanded,
            actual_value: actual,
            error: None,
            timestamp: Instant::now(),
            execution_time_us,
        }
    }

    /// A command rejected by a check or the device itself.
    pub fn rejected(commanded: f64, actual: f64, error: ActuatorError) -> Self {
        Self {
            success: false,
            commanded_value: commanded,
            actual_value: actual,
            error: Some(error),
            timestamp: Instant::now(),
            execution_time_us: 0.0,
        }
    }
}

/// Accumulating actuator performance statistics (atomic, lock-free).
#[derive(Debug, Default)]
pub struct ActuatorStats {
    total_commands: AtomicU64,
    successful_commands: AtomicU64,
    error_count: AtomicU64,
    range_violations: AtomicU64,
    rate_violations: AtomicU64,
    sum_command_ns: AtomicU64,
    max_command_us: AtomicF64,
    min_commanded: AtomicF64,
    max_commanded: AtomicF64,
}

impl ActuatorStats {
    /// Fresh statistics block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful command, its value and duration.
    pub fn record_success(&self, commanded: f64, elapsed: Duration) {
        let previous = self.total_commands.fetch_add(1, Ordering::Relaxed);
        self.successful_commands.fetch_add(1, Ordering::Relaxed);

        self.sum_command_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.max_command_us.fetch_max(elapsed.as_secs_f64() * 1e6);

        if previous == 0 {
            self.min_commanded.store(commanded, Ordering::Relaxed);
            self.max_commanded.store(commanded, Ordering::Relaxed);
        } else {
            self.min_commanded.fetch_min(commanded);
            self.max_commanded.fetch_max(commanded);
        }
    }

    /// Record a rejected command with its classification.
    pub fn record_error(&self, error: ActuatorError) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
        self.error_count.fetch_add(1, Ordering::Relaxed);
        match error {
            ActuatorError::OutOfRange => {
                self.range_violations.fetch_add(1, Ordering::Relaxed);
            }
            ActuatorError::RateLimit => {
                self.rate_violations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Total commands issued.
    pub fn total_commands(&self) -> u64 {
        self.total_commands.load(Ordering::Relaxed)
    }

    /// Successful commands.
    pub fn successful_commands(&self) -> u64 {
        self.successful_commands.load(Ordering::Relaxed)
    }

    /// Total rejected commands.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Commands rejected by the range check.
    pub fn range_violations(&self) -> u64 {
        self.range_violations.load(Ordering::Relaxed)
    }

    /// Commands rejected by the rate check.
    pub fn rate_violations(&self) -> u64 {
        self.rate_violations.load(Ordering::Relaxed)
    }

    /// Success rate [%]; 100 when no commands have been issued.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_commands();
        if total == 0 {
            return 100.0;
        }
        self.successful_commands() as f64 / total as f64 * 100.0
    }

    /// Mean command execution time over successful commands [µs].
    pub fn mean_command_time_us(&self) -> f64 {
        let successful = self.successful_commands();
        if successful == 0 {
            return 0.0;
        }
        self.sum_command_ns.load(Ordering::Relaxed) as f64 / successful as f64 / 1e3
    }

    /// Maximum command execution time [µs].
    pub fn max_command_time_us(&self) -> f64 {
        self.max_command_us.load(Ordering::Relaxed)
    }

    /// Smallest value commanded so far.
    pub fn min_commanded(&self) -> f64 {
        self.min_commanded.load(Ordering::Relaxed)
    }

    /// Largest value commanded so far.
    pub fn max_commanded(&self) -> f64 {
        self.max_commanded.load(Ordering::Relaxed)
    }

    /// Zero all counters and timing statistics.
    pub fn reset(&self) {
        self.total_commands.store(0, Ordering::Relaxed);
        self.successful_commands.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.range_violations.store(0, Ordering::Relaxed);
        self.rate_violations.store(0, Ordering::Relaxed);
        self.sum_command_ns.store(0, Ordering::Relaxed);
        self.max_command_us.store(0.0, Ordering::Relaxed);
        self.min_commanded.store(0.0, Ordering::Relaxed);
        self.max_commanded.store(0.0, Ordering::Relaxed);
    }
}

/// Range/rate gate wrapping the raw device path.
///
/// Owns the command history used for rate limiting: on the first command
/// after initialization the history is empty and no rate check applies;
/// afterwards `|Δvalue| / Δt` is measured against the wall clock of the
/// previous accepted command.
#[derive(Debug, Default)]
pub struct ActuatorGate {
    last_command_time: Option<Instant>,
    last_commanded_value: f64,
    target_value: f64,
}

impl ActuatorGate {
    /// Empty gate with no command history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently accepted command value.
    #[inline]
    pub fn target(&self) -> f64 {
        self.target_value
    }

    /// Forget the command history and set the target (used by
    /// initialization and emergency paths).
    pub fn reset(&mut self, target: f64) {
        self.last_command_time = None;
        self.last_commanded_value = target;
        self.target_value = target;
    }

    /// Admission checks for a command issued at `now`: initialization,
    /// range, then rate against the previous accepted command.
    pub fn precheck(
        &self,
        initialized: bool,
        limits: (f64, f64),
        max_rate: f64,
        value: f64,
        now: Instant,
    ) -> Result<(), ActuatorError> {
        if !initialized {
            return Err(ActuatorError::NotInitialized);
        }

        let (min, max) = limits;
        if value < min || value > max {
            return Err(ActuatorError::OutOfRange);
        }

        if let Some(last_time) = self.last_command_time {
            let dt = now.duration_since(last_time).as_secs_f64();
            if dt > 0.0 {
                let rate = (value - self.last_commanded_value).abs() / dt;
                if rate > max_rate {
                    return Err(ActuatorError::RateLimit);
                }
            }
        }

        Ok(())
    }

    /// Record an accepted command for subsequent rate checks.
    pub fn commit(&mut self, value: f64, at: Instant) {
        self.last_command_time = Some(at);
        self.last_commanded_value = value;
        self.target_value = value;
    }
}

/// Contract for all actuator types in the control system.
pub trait Actuator {
    /// Command the device to `value`. The fallible device path.
    fn set(&mut self, value: f64) -> Result<(), ActuatorError>;

    /// Checked command: range check, rate check, then the device set.
    /// Never fails — the outcome is reported in the [`SetResult`].
    fn set_with_result(&mut self, value: f64) -> SetResult;

    /// Current device value.
    fn get(&self) -> f64;

    /// Most recently accepted command value.
    fn target(&self) -> f64;

    /// Safety limits as `(min, max)`.
    fn limits(&self) -> (f64, f64);

    /// Configure safety limits.
    fn set_limits(&mut self, min: f64, max: f64);

    /// Maximum allowed rate of change per second.
    fn max_rate(&self) -> f64;

    /// Configure the maximum rate of change per second.
    fn set_max_rate(&mut self, rate: f64);

    /// Initialize the actuator hardware. Resets statistics and history.
    fn initialize(&mut self) -> Result<(), ActuatorError>;

    /// Shut down the actuator, moving it to a safe state.
    fn shutdown(&mut self);

    /// Run a device-specific self test.
    fn self_test(&mut self) -> bool;

    /// Immediately move the device to its safe state and latch.
    fn emergency_stop(&mut self);

    /// Clear the emergency-stop latch so commands are accepted again.
    fn reset_emergency(&mut self);

    /// Unique actuator identifier.
    fn id(&self) -> &str;

    /// Actuator type name for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Command units (e.g. "A").
    fn units(&self) -> &'static str;

    /// Smallest controllable change.
    fn resolution(&self) -> f64;

    /// True once `initialize` has succeeded.
    fn is_initialized(&self) -> bool;

    /// Classification of the most recent failure, if any.
    fn last_error(&self) -> Option<ActuatorError>;

    /// Accumulating performance statistics.
    fn stats(&self) -> &ActuatorStats;

    /// True if the device is within `tolerance` of its commanded target.
    fn is_at_target(&self, tolerance: f64) -> bool {
        (self.get() - self.target()).abs() <= tolerance
    }

    /// Reset accumulated statistics.
    fn reset_stats(&self) {
        self.stats().reset();
    }

    /// Health predicate: initialized, no standing error, and success rate
    /// above the actuator threshold.
    fn is_healthy(&self) -> bool {
        self.is_initialized()
            && self.last_error().is_none()
            && self.stats().success_rate() > ACTUATOR_HEALTH_SUCCESS_RATE
    }
}
