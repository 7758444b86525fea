//! Drift-free periodic clock for the control loop.
//!
//! Wakeups are scheduled on absolute deadlines: each wait advances the
//! stored deadline by exactly one period instead of re-anchoring to the
//! current time, so sleep jitter does not accumulate into drift. Changing
//! the period is the one exception — the schedule re-anchors to avoid a
//! large jump when switching frequencies.

use std::time::{Duration, Instant};

/// Periodic scheduler over the monotonic clock.
#[derive(Debug)]
pub struct PeriodicClock {
    period: Duration,
    next: Instant,
}

impl PeriodicClock {
    /// Construct with the given period; the first deadline is one period
    /// from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    /// Sleep until the next scheduled deadline, then advance the schedule
    /// by one period.
    pub fn wait_next(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
        }
        self.next += self.period;
    }

    /// Current period.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Change the period, re-anchoring the next deadline to `now + period`
    /// to avoid a large jump.
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
        self.next = Instant::now() + period;
    }

    /// Time remaining until the next deadline (zero if already due).
    pub fn time_to_next(&self) -> Duration {
        self.next.saturating_duration_since(Instant::now())
    }
}
