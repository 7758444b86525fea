//! Topic-tagged telemetry frames.
//!
//! Frame payloads are JSON objects. The `telemetry` topic preserves the
//! five required keys verbatim: `t` (seconds), `pos` (mm), `intensity`,
//! `mag` (A) and `deadline_miss` (0|1); extended keys ride alongside.

use orbit_common::telemetry::TelemetrySample;
use serde_json::json;

/// Publication topic of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One frame per control cycle.
    Telemetry,
    /// Operational alarms (frequency reduction and similar).
    Alarm,
    /// Loop exception reports.
    Error,
    /// Lifecycle events (shutdown).
    Status,
}

impl Topic {
    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Alarm => "alarm",
            Self::Error => "error",
            Self::Status => "status",
        }
    }
}

/// A topic-tagged payload ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Publication topic.
    pub topic: Topic,
    /// JSON payload.
    pub payload: String,
}

/// Loop-level boolean state published with every telemetry frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleFlags {
    /// Control calculation enabled.
    pub control_enabled: bool,
    /// Emergency stop latched.
    pub emergency_stop: bool,
    /// MPS grants beam permit.
    pub mps_safe: bool,
    /// MPS abort latched.
    pub mps_abort: bool,
}

/// Per-cycle telemetry frame.
pub fn telemetry_frame(sample: &TelemetrySample, flags: &CycleFlags) -> String {
    json!({
        "t": sample.t_sec,
        "pos": sample.pos,
        "intensity": sample.intensity,
        "mag": sample.magnet_current,
        "deadline_miss": if sample.deadline_miss { 1 } else { 0 },
        "cycle": sample.cycle,
        "loop_time_ms": sample.loop_time_us as f64 / 1000.0,
        "pid_error": sample.error,
        "pid_p": sample.pid_p,
        "pid_i": sample.pid_i,
        "pid_d": sample.pid_d,
        "setpoint": sample.setpoint,
        "control_enabled": flags.control_enabled,
        "emergency_stop": flags.emergency_stop,
        "mps_safe": flags.mps_safe,
        "mps_abort": flags.mps_abort,
    })
    .to_string()
}

/// Alarm frame announcing an automatic loop-frequency reduction.
pub fn frequency_reduced_frame(old_freq_hz: f64, new_freq_hz: f64) -> String {
    json!({
        "type": "frequency_reduced",
        "old_freq": old_freq_hz,
        "new_freq": new_freq_hz,
        "reason": "deadline_misses",
    })
    .to_string()
}

/// Error frame reporting an exception caught inside the cycle.
pub fn loop_error_frame(error: &str, loop_count: u64) -> String {
    json!({
        "type": "loop_error",
        "error": error,
        "loop_count": loop_count,
    })
    .to_string()
}

/// Status frame emitted when the loop exits.
pub fn shutdown_frame(loop_count: u64) -> String {
    json!({
        "type": "shutdown",
        "loop_count": loop_count,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn telemetry_frame_has_required_keys() {
        let sample = TelemetrySample {
            t_sec: 1.25,
            pos: 0.5,
            intensity: 800.0,
            magnet_current: -0.1,
            deadline_miss: true,
            ..TelemetrySample::default()
        };
        let v = parse(&telemetry_frame(&sample, &CycleFlags::default()));

        assert_eq!(v["t"], 1.25);
        assert_eq!(v["pos"], 0.5);
        assert_eq!(v["intensity"], 800.0);
        assert_eq!(v["mag"], -0.1);
        assert_eq!(v["deadline_miss"], 1);
    }

    #[test]
    fn deadline_miss_is_zero_or_one() {
        let sample = TelemetrySample::default();
        let v = parse(&telemetry_frame(&sample, &CycleFlags::default()));
        assert_eq!(v["deadline_miss"], 0);
    }

    #[test]
    fn telemetry_frame_extended_keys() {
        let sample = TelemetrySample {
            error: 0.25,
            pid_p: 0.15,
            pid_i: 0.05,
            pid_d: 0.0,
            loop_time_us: 1500,
            ..TelemetrySample::default()
        };
        let flags = CycleFlags {
            control_enabled: true,
            emergency_stop: false,
            mps_safe: true,
            mps_abort: false,
        };
        let v = parse(&telemetry_frame(&sample, &flags));

        assert_eq!(v["pid_error"], 0.25);
        assert_eq!(v["pid_p"], 0.15);
        assert_eq!(v["loop_time_ms"], 1.5);
        assert_eq!(v["control_enabled"], true);
        assert_eq!(v["emergency_stop"], false);
        assert_eq!(v["mps_safe"], true);
        assert_eq!(v["mps_abort"], false);
    }

    #[test]
    fn frequency_reduced_frame_shape() {
        let v = parse(&frequency_reduced_frame(1000.0, 800.0));
        assert_eq!(v["type"], "frequency_reduced");
        assert_eq!(v["old_freq"], 1000.0);
        assert_eq!(v["new_freq"], 800.0);
        assert_eq!(v["reason"], "deadline_misses");
    }

    #[test]
    fn loop_error_and_shutdown_frames() {
        let v = parse(&loop_error_frame("sensor fault", 42));
        assert_eq!(v["type"], "loop_error");
        assert_eq!(v["error"], "sensor fault");
        assert_eq!(v["loop_count"], 42);

        let v = parse(&shutdown_frame(99));
        assert_eq!(v["type"], "shutdown");
        assert_eq!(v["loop_count"], 99);
    }

    #[test]
    fn topic_wire_names() {
        assert_eq!(Topic::Telemetry.as_str(), "telemetry");
        assert_eq!(Topic::Alarm.as_str(), "alarm");
        assert_eq!(Topic::Error.as_str(), "error");
        assert_eq!(Topic::Status.as_str(), "status");
    }
}
