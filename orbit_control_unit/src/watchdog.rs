//! Deadline watchdog for the control cycle.
//!
//! Checks every cycle's execution time against a budget, tracks
//! consecutive and lifetime violations, and invokes callbacks when
//! consecutive thresholds are crossed. Statistics are atomic so observer
//! threads can read them while the loop runs; min/max updates use
//! compare-and-swap retry loops.
//!
//! Callbacks execute on the loop thread and must not block, allocate or
//! perform I/O.

use orbit_common::consts::{
    WATCHDOG_CRITICAL_CONSECUTIVE, WATCHDOG_WARNING_CONSECUTIVE, WATCHDOG_WARNING_RATIO,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Callback invoked with the watchdog itself for context.
pub type WatchdogCallback = Box<dyn Fn(&Watchdog) + Send>;

/// Per-cycle execution budget checker.
pub struct Watchdog {
    budget: Duration,
    warning_ratio: f64,
    warning_threshold: Duration,

    // Violation tracking.
    tripped: AtomicBool,
    consecutive_misses: AtomicU32,
    total_violations: AtomicU64,
    total_checks: AtomicU64,

    // Warning tracking.
    consecutive_warnings: AtomicU32,
    total_warnings: AtomicU64,

    // Execution-time statistics.
    min_execution_ns: AtomicU64,
    max_execution_ns: AtomicU64,
    sum_execution_ns: AtomicU64,

    // Thresholds for callbacks.
    critical_consecutive_threshold: u32,
    warning_consecutive_threshold: u32,

    critical_callback: Option<WatchdogCallback>,
    warning_callback: Option<WatchdogCallback>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("budget", &self.budget)
            .field("warning_threshold", &self.warning_threshold)
            .field("tripped", &self.is_tripped())
            .field("total_checks", &self.total_checks())
            .field("total_violations", &self.total_violations())
            .finish()
    }
}

impl Watchdog {
    /// Construct with an execution budget and the default warning ratio.
    pub fn new(budget: Duration) -> Self {
        Self::with_warning_ratio(budget, WATCHDOG_WARNING_RATIO)
    }

    /// Construct with an explicit warning ratio (fraction of the budget).
    pub fn with_warning_ratio(budget: Duration, warning_ratio: f64) -> Self {
        Self {
            budget,
            warning_ratio,
            warning_threshold: budget.mul_f64(warning_ratio),
            tripped: AtomicBool::new(false),
            consecutive_misses: AtomicU32::new(0),
            total_violations: AtomicU64::new(0),
            total_checks: AtomicU64::new(0),
            consecutive_warnings: AtomicU32::new(0),
            total_warnings: AtomicU64::new(0),
            min_execution_ns: AtomicU64::new(u64::MAX),
            max_execution_ns: AtomicU64::new(0),
            sum_execution_ns: AtomicU64::new(0),
            critical_consecutive_threshold: WATCHDOG_CRITICAL_CONSECUTIVE,
            warning_consecutive_threshold: WATCHDOG_WARNING_CONSECUTIVE,
            critical_callback: None,
            warning_callback: None,
        }
    }

    /// Check a cycle delimited by `start` and `end`.
    ///
    /// Returns true if the deadline was missed.
    pub fn check(&self, start: Instant, end: Instant) -> bool {
        self.check_execution(end.saturating_duration_since(start))
    }

    /// Check an already-measured execution duration.
    pub fn check_duration(&self, execution: Duration) -> bool {
        self.check_execution(execution)
    }

    fn check_execution(&self, execution: Duration) -> bool {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        self.update_statistics(execution);

        let missed = execution > self.budget;
        self.tripped.store(missed, Ordering::Relaxed);

        if missed {
            self.total_violations.fetch_add(1, Ordering::Relaxed);
            let consecutive = self.consecutive_misses.fetch_add(1, Ordering::Relaxed) + 1;
            if consecutive >= self.critical_consecutive_threshold {
                if let Some(cb) = &self.critical_callback {
                    cb(self);
                }
            }
        } else {
            self.consecutive_misses.store(0, Ordering::Relaxed);
        }

        let warned = execution > self.warning_threshold;
        if warned {
            self.total_warnings.fetch_add(1, Ordering::Relaxed);
            let consecutive = self.consecutive_warnings.fetch_add(1, Ordering::Relaxed) + 1;
            if consecutive >= self.warning_consecutive_threshold {
                if let Some(cb) = &self.warning_callback {
                    cb(self);
                }
            }
        } else {
            self.consecutive_warnings.store(0, Ordering::Relaxed);
        }

        missed
    }

    fn update_statistics(&self, execution: Duration) {
        let exec_ns = execution.as_nanos() as u64;

        let mut current = self.min_execution_ns.load(Ordering::Relaxed);
        while exec_ns < current {
            match self.min_execution_ns.compare_exchange_weak(
                current,
                exec_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        let mut current = self.max_execution_ns.load(Ordering::Relaxed);
        while exec_ns > current {
            match self.max_execution_ns.compare_exchange_weak(
                current,
                exec_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        self.sum_execution_ns.fetch_add(exec_ns, Ordering::Relaxed);
    }

    /// Clear the tripped state and consecutive counters, preserving
    /// lifetime statistics.
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::Relaxed);
        self.consecutive_misses.store(0, Ordering::Relaxed);
        self.consecutive_warnings.store(0, Ordering::Relaxed);
    }

    /// Clear everything, statistics included.
    pub fn reset_all(&self) {
        self.reset();
        self.total_violations.store(0, Ordering::Relaxed);
        self.total_checks.store(0, Ordering::Relaxed);
        self.total_warnings.store(0, Ordering::Relaxed);
        self.min_execution_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_execution_ns.store(0, Ordering::Relaxed);
        self.sum_execution_ns.store(0, Ordering::Relaxed);
    }

    /// Update the budget; the warning threshold scales proportionally.
    pub fn set_budget(&mut self, budget: Duration) {
        self.budget = budget;
        self.warning_threshold = budget.mul_f64(self.warning_ratio);
    }

    /// Configure the consecutive-violation thresholds for the callbacks.
    pub fn set_thresholds(&mut self, critical: u32, warning: u32) {
        self.critical_consecutive_threshold = critical;
        self.warning_consecutive_threshold = warning;
    }

    /// Install the critical-violation callback.
    pub fn set_critical_callback(&mut self, callback: WatchdogCallback) {
        self.critical_callback = Some(callback);
    }

    /// Install the warning-violation callback.
    pub fn set_warning_callback(&mut self, callback: WatchdogCallback) {
        self.warning_callback = Some(callback);
    }

    /// True if the most recent check missed its deadline.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }

    /// Consecutive deadline misses.
    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses.load(Ordering::Relaxed)
    }

    /// Consecutive warning-level cycles.
    pub fn consecutive_warnings(&self) -> u32 {
        self.consecutive_warnings.load(Ordering::Relaxed)
    }

    /// Lifetime deadline misses.
    pub fn total_violations(&self) -> u64 {
        self.total_violations.load(Ordering::Relaxed)
    }

    /// Lifetime warning-level cycles.
    pub fn total_warnings(&self) -> u64 {
        self.total_warnings.load(Ordering::Relaxed)
    }

    /// Lifetime checks performed.
    pub fn total_checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }

    /// Deadline misses as a percentage of all checks.
    pub fn violation_rate(&self) -> f64 {
        let checks = self.total_checks();
        if checks == 0 {
            return 0.0;
        }
        self.total_violations() as f64 / checks as f64 * 100.0
    }

    /// Warning-level cycles as a percentage of all checks.
    pub fn warning_rate(&self) -> f64 {
        let checks = self.total_checks();
        if checks == 0 {
            return 0.0;
        }
        self.total_warnings() as f64 / checks as f64 * 100.0
    }

    /// Mean execution time [ns].
    pub fn mean_execution_ns(&self) -> f64 {
        let checks = self.total_checks();
        if checks == 0 {
            return 0.0;
        }
        self.sum_execution_ns.load(Ordering::Relaxed) as f64 / checks as f64
    }

    /// Minimum execution time [ns]; 0 before the first check.
    pub fn min_execution_ns(&self) -> u64 {
        let v = self.min_execution_ns.load(Ordering::Relaxed);
        if v == u64::MAX {
            0
        } else {
            v
        }
    }

    /// Maximum execution time [ns].
    pub fn max_execution_ns(&self) -> u64 {
        self.max_execution_ns.load(Ordering::Relaxed)
    }

    /// Current budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Current warning threshold.
    pub fn warning_threshold(&self) -> Duration {
        self.warning_threshold
    }

    /// True if consecutive misses have reached the critical threshold.
    pub fn is_critical(&self) -> bool {
        self.consecutive_misses() >= self.critical_consecutive_threshold
    }

    /// True if the violation rate is under 1 % and not in a critical run.
    pub fn is_healthy(&self) -> bool {
        self.violation_rate() < 1.0 && !self.is_critical()
    }
}
