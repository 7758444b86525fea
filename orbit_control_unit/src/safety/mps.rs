//! Machine Protection System: system-wide safety arbitration.
//!
//! Owns the beam loss monitors and arbitrates the beam permit. The first
//! monitor reporting an abort-level loss triggers a beam abort, which
//! latches until an explicit reset. Callbacks execute on the loop thread
//! and must not block, allocate or perform I/O.

use super::blm::{BeamLossMonitor, BlmStatistics};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{error, info};

/// System-wide machine protection arbiter.
pub struct MachineProtectionSystem {
    blms: Vec<BeamLossMonitor>,
    beam_permit: AtomicBool,
    abort_latched: AtomicBool,
    total_aborts: AtomicU64,

    beam_abort_callback: Option<Box<dyn Fn() + Send>>,
    alarm_callback: Option<Box<dyn Fn(&str) + Send>>,
}

impl Default for MachineProtectionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineProtectionSystem {
    /// Construct with the standard three-monitor beamline layout.
    pub fn new() -> Self {
        let mut mps = Self {
            blms: Vec::new(),
            beam_permit: AtomicBool::new(true),
            abort_latched: AtomicBool::new(false),
            total_aborts: AtomicU64::new(0),
            beam_abort_callback: None,
            alarm_callback: None,
        };
        mps.add_blm("BLM_UPSTREAM");
        mps.add_blm("BLM_TARGET");
        mps.add_blm("BLM_DOWNSTREAM");
        mps
    }

    /// Add a beam loss monitor. Monitors are evaluated in insertion order.
    pub fn add_blm(&mut self, id: impl Into<String>) {
        self.blms.push(BeamLossMonitor::new(id));
    }

    /// Evaluate all monitors against the current beam conditions.
    ///
    /// Returns false if beam operation is not permitted: no permit, an
    /// abort already latched, or a monitor crossing its abort threshold
    /// (which triggers the beam abort).
    pub fn check_safety(&self, beam_current: f64, beam_position: f64) -> bool {
        if !self.beam_permit.load(Ordering::Acquire) || self.abort_latched.load(Ordering::Acquire) {
            return false;
        }

        for blm in &self.blms {
            if !blm.update_measurement(beam_current, beam_position) {
                self.trigger_beam_abort("BLM_ABORT", blm.id());
                return false;
            }
        }

        true
    }

    /// Latch a beam abort: revoke the permit, count it, and notify.
    pub fn trigger_beam_abort(&self, reason: &str, source: &str) {
        self.abort_latched.store(true, Ordering::Release);
        self.beam_permit.store(false, Ordering::Release);
        self.total_aborts.fetch_add(1, Ordering::Relaxed);

        error!(reason, source, "beam abort triggered");

        if let Some(cb) = &self.beam_abort_callback {
            cb();
        }

        if let Some(cb) = &self.alarm_callback {
            let message = if source.is_empty() {
                format!("BEAM ABORT: {reason}")
            } else {
                format!("BEAM ABORT: {reason} (Source: {source})")
            };
            cb(&message);
        }
    }

    /// Clear the abort latch, restore the beam permit and reset all
    /// monitor statistics.
    pub fn reset(&self) {
        self.abort_latched.store(false, Ordering::Release);
        self.beam_permit.store(true, Ordering::Release);
        for blm in &self.blms {
            blm.reset_statistics();
        }
        info!("machine protection system reset, beam permitted");
    }

    /// Install the beam-abort callback.
    pub fn set_beam_abort_callback(&mut self, callback: Box<dyn Fn() + Send>) {
        self.beam_abort_callback = Some(callback);
    }

    /// Install the alarm-message callback.
    pub fn set_alarm_callback(&mut self, callback: Box<dyn Fn(&str) + Send>) {
        self.alarm_callback = Some(callback);
    }

    /// True while beam operation is permitted.
    pub fn is_beam_permitted(&self) -> bool {
        self.beam_permit.load(Ordering::Acquire) && !self.abort_latched.load(Ordering::Acquire)
    }

    /// True while an abort is latched.
    pub fn is_abort_active(&self) -> bool {
        self.abort_latched.load(Ordering::Acquire)
    }

    /// Lifetime abort count.
    pub fn abort_count(&self) -> u64 {
        self.total_aborts.load(Ordering::Relaxed)
    }

    /// Look up a monitor by id.
    pub fn blm(&self, id: &str) -> Option<&BeamLossMonitor> {
        self.blms.iter().find(|blm| blm.id() == id)
    }

    /// Look up a monitor by id for callback installation.
    pub fn blm_mut(&mut self, id: &str) -> Option<&mut BeamLossMonitor> {
        self.blms.iter_mut().find(|blm| blm.id() == id)
    }

    /// Counter snapshots of all monitors, in evaluation order.
    pub fn all_blm_statistics(&self) -> Vec<BlmStatistics> {
        self.blms.iter().map(BeamLossMonitor::statistics).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};

    #[test]
    fn default_layout_has_three_monitors() {
        let mps = MachineProtectionSystem::new();
        assert!(mps.blm("BLM_UPSTREAM").is_some());
        assert!(mps.blm("BLM_TARGET").is_some());
        assert!(mps.blm("BLM_DOWNSTREAM").is_some());
        assert!(mps.blm("BLM_NOWHERE").is_none());
        assert_eq!(mps.all_blm_statistics().len(), 3);
    }

    #[test]
    fn safe_conditions_keep_the_permit() {
        let mps = MachineProtectionSystem::new();
        assert!(mps.is_beam_permitted());
        assert!(mps.check_safety(100.0, 0.1));
        assert!(mps.is_beam_permitted());
        assert_eq!(mps.abort_count(), 0);
    }

    #[test]
    fn dangerous_conditions_trigger_abort() {
        let mut mps = MachineProtectionSystem::new();

        let aborted = Arc::new(AtomicU32::new(0));
        let a = Arc::clone(&aborted);
        mps.set_beam_abort_callback(Box::new(move || {
            a.fetch_add(1, Ordering::Relaxed);
        }));

        let alarm = Arc::new(Mutex::new(String::new()));
        let alarm_sink = Arc::clone(&alarm);
        mps.set_alarm_callback(Box::new(move |msg| {
            *alarm_sink.lock().unwrap() = msg.to_string();
        }));

        // High current, far off axis: L = 1e-6·2·50 = 1e-4 > 1e-5.
        assert!(!mps.check_safety(50_000.0, 10.0));
        assert_eq!(aborted.load(Ordering::Relaxed), 1);
        assert!(!mps.is_beam_permitted());
        assert!(mps.is_abort_active());
        assert_eq!(mps.abort_count(), 1);

        let message = alarm.lock().unwrap().clone();
        assert!(message.contains("BEAM ABORT"));
        assert!(message.contains("BLM_UPSTREAM"));
    }

    #[test]
    fn abort_latches_until_reset() {
        let mps = MachineProtectionSystem::new();
        assert!(!mps.check_safety(50_000.0, 10.0));

        // Conditions recover, but the latch holds.
        assert!(!mps.check_safety(100.0, 0.0));
        assert!(!mps.is_beam_permitted());

        mps.reset();
        assert!(mps.is_beam_permitted());
        assert!(!mps.is_abort_active());
        assert!(mps.check_safety(100.0, 0.0));
        // Monitor statistics were cleared by the reset, then one safe
        // measurement per BLM was folded in by check_safety.
        for stats in mps.all_blm_statistics() {
            assert_eq!(stats.total_measurements, 1);
            assert_eq!(stats.abort_count, 0);
        }
    }

    #[test]
    fn first_tripping_monitor_stops_evaluation() {
        let mps = MachineProtectionSystem::new();
        assert!(!mps.check_safety(50_000.0, 10.0));

        let stats = mps.all_blm_statistics();
        // Evaluation is in fixed order and aborts at the first monitor.
        assert_eq!(stats[0].total_measurements, 1);
        assert_eq!(stats[0].abort_count, 1);
        assert_eq!(stats[1].total_measurements, 0);
        assert_eq!(stats[2].total_measurements, 0);
    }

    #[test]
    fn manual_abort_counts() {
        let mps = MachineProtectionSystem::new();
        mps.trigger_beam_abort("OPERATOR", "");
        assert!(mps.is_abort_active());
        assert_eq!(mps.abort_count(), 1);
        assert!(!mps.check_safety(1.0, 0.0));
    }

    #[test]
    fn permit_invariant() {
        let mps = MachineProtectionSystem::new();
        // is_beam_permitted implies no abort latched.
        assert!(mps.is_beam_permitted() && !mps.is_abort_active());
        mps.trigger_beam_abort("TEST", "");
        assert!(!mps.is_beam_permitted());
    }
}
