//! Typed request/response codec for the JSON command channel.
//!
//! One request maps to one response. Malformed JSON, structurally invalid
//! requests and unknown commands are distinguished so the loop can answer
//! with the right error string without ever mutating its state.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// A decoded command request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum CommandRequest {
    /// Update PID gains; missing fields preserved.
    SetPid {
        /// New proportional gain.
        kp: Option<f64>,
        /// New integral gain.
        ki: Option<f64>,
        /// New derivative gain.
        kd: Option<f64>,
    },
    /// Change the loop frequency (clamped to the supported band).
    SetFreq {
        /// Requested frequency [Hz].
        hz: f64,
    },
    /// Change the position setpoint without derivative kick.
    SetSetpoint {
        /// New setpoint [mm].
        sp: f64,
    },
    /// Full reset: PID, setpoint, actuator, emergency latch, MPS, counters.
    Recommission,
    /// Latch emergency stop and zero the actuator.
    EmergencyStop,
    /// Enable or disable the control calculation.
    EnableControl {
        /// Desired control-enable state.
        enable: bool,
    },
    /// Snapshot of loop/PID/MPS state.
    GetStatus,
    /// Stop the control loop.
    Stop,
}

/// Decode failure classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("JSON parse error")]
    Parse,
    /// Valid JSON but not an object with a string `cmd` field, or the
    /// parameters have the wrong shape.
    #[error("Invalid command format")]
    InvalidFormat,
    /// The `cmd` value names no known command.
    #[error("Unknown command")]
    UnknownCommand,
}

/// Names accepted in the `cmd` field.
const KNOWN_COMMANDS: &[&str] = &[
    "set_pid",
    "set_freq",
    "set_setpoint",
    "recommission",
    "emergency_stop",
    "enable_control",
    "get_status",
    "stop",
];

/// Decode a raw command payload into a typed request.
pub fn decode_request(payload: &str) -> Result<CommandRequest, DecodeError> {
    let value: Value = serde_json::from_str(payload).map_err(|_| DecodeError::Parse)?;

    let cmd = value
        .as_object()
        .and_then(|obj| obj.get("cmd"))
        .and_then(Value::as_str)
        .ok_or(DecodeError::InvalidFormat)?;

    if !KNOWN_COMMANDS.contains(&cmd) {
        return Err(DecodeError::UnknownCommand);
    }

    serde_json::from_value(value).map_err(|_| DecodeError::InvalidFormat)
}

/// Successful acknowledgement with a human-readable note.
pub fn ok_response(message: &str) -> String {
    json!({"ok": true, "message": message}).to_string()
}

/// Failure response carrying the error string.
pub fn error_response(error: &str) -> String {
    json!({"ok": false, "error": error}).to_string()
}

/// Response for a failed decode.
pub fn decode_error_response(error: &DecodeError) -> String {
    error_response(&error.to_string())
}

/// PID gain triple as reported by `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGainsStatus {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
}

/// Snapshot returned by the `get_status` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Always true for a successful status query.
    pub ok: bool,
    /// Current loop frequency [Hz].
    pub loop_frequency: f64,
    /// Cycles executed since start or recommission.
    pub loop_count: u64,
    /// Cumulative deadline misses.
    pub deadline_misses: u64,
    /// Running-average loop execution time [ms].
    pub avg_loop_time_ms: f64,
    /// Maximum loop execution time [ms].
    pub max_loop_time_ms: f64,
    /// Control calculation enabled.
    pub control_enabled: bool,
    /// Emergency stop latched.
    pub emergency_stop: bool,
    /// MPS grants beam permit.
    pub mps_safe: bool,
    /// MPS abort latched.
    pub mps_abort: bool,
    /// Current PID gains.
    pub pid_gains: PidGainsStatus,
    /// Current position setpoint [mm].
    pub setpoint: f64,
}

impl StatusSnapshot {
    /// Serialize the snapshot as the `get_status` response payload.
    pub fn to_json(&self) -> String {
        // Serialization of this plain struct cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| error_response("status serialization"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn decode_set_pid_with_partial_gains() {
        let req = decode_request(r#"{"cmd":"set_pid","kp":0.2,"ki":0.01}"#).unwrap();
        assert_eq!(
            req,
            CommandRequest::SetPid {
                kp: Some(0.2),
                ki: Some(0.01),
                kd: None,
            }
        );
    }

    #[test]
    fn decode_all_commands() {
        assert_eq!(
            decode_request(r#"{"cmd":"set_freq","hz":500}"#).unwrap(),
            CommandRequest::SetFreq { hz: 500.0 }
        );
        assert_eq!(
            decode_request(r#"{"cmd":"set_setpoint","sp":0.5}"#).unwrap(),
            CommandRequest::SetSetpoint { sp: 0.5 }
        );
        assert_eq!(
            decode_request(r#"{"cmd":"recommission"}"#).unwrap(),
            CommandRequest::Recommission
        );
        assert_eq!(
            decode_request(r#"{"cmd":"emergency_stop"}"#).unwrap(),
            CommandRequest::EmergencyStop
        );
        assert_eq!(
            decode_request(r#"{"cmd":"enable_control","enable":false}"#).unwrap(),
            CommandRequest::EnableControl { enable: false }
        );
        assert_eq!(
            decode_request(r#"{"cmd":"get_status"}"#).unwrap(),
            CommandRequest::GetStatus
        );
        assert_eq!(
            decode_request(r#"{"cmd":"stop"}"#).unwrap(),
            CommandRequest::Stop
        );
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert_eq!(decode_request("{not json"), Err(DecodeError::Parse));
        assert_eq!(
            decode_error_response(&DecodeError::Parse),
            r#"{"error":"JSON parse error","ok":false}"#
        );
    }

    #[test]
    fn missing_cmd_is_invalid_format() {
        assert_eq!(
            decode_request(r#"{"hz":500}"#),
            Err(DecodeError::InvalidFormat)
        );
        assert_eq!(decode_request(r#"[1,2,3]"#), Err(DecodeError::InvalidFormat));
        assert_eq!(
            decode_request(r#"{"cmd":17}"#),
            Err(DecodeError::InvalidFormat)
        );
    }

    #[test]
    fn unknown_command_is_distinguished() {
        assert_eq!(
            decode_request(r#"{"cmd":"warp_drive"}"#),
            Err(DecodeError::UnknownCommand)
        );
        assert_eq!(
            decode_error_response(&DecodeError::UnknownCommand),
            r#"{"error":"Unknown command","ok":false}"#
        );
    }

    #[test]
    fn wrong_param_shape_is_invalid_format() {
        assert_eq!(
            decode_request(r#"{"cmd":"set_freq","hz":"fast"}"#),
            Err(DecodeError::InvalidFormat)
        );
    }

    #[test]
    fn responses_are_well_formed() {
        let ok: Value = serde_json::from_str(&ok_response("done")).unwrap();
        assert_eq!(ok["ok"], true);
        assert_eq!(ok["message"], "done");

        let err: Value = serde_json::from_str(&error_response("nope")).unwrap();
        assert_eq!(err["ok"], false);
        assert_eq!(err["error"], "nope");
    }

    #[test]
    fn status_snapshot_roundtrip() {
        let status = StatusSnapshot {
            ok: true,
            loop_frequency: 1000.0,
            loop_count: 1234,
            deadline_misses: 2,
            avg_loop_time_ms: 0.12,
            max_loop_time_ms: 0.9,
            control_enabled: true,
            emergency_stop: false,
            mps_safe: true,
            mps_abort: false,
            pid_gains: PidGainsStatus {
                kp: 0.6,
                ki: 0.05,
                kd: 0.0,
            },
            setpoint: 0.0,
        };
        let parsed: StatusSnapshot = serde_json::from_str(&status.to_json()).unwrap();
        assert_eq!(parsed, status);

        let v: Value = serde_json::from_str(&status.to_json()).unwrap();
        assert_eq!(v["ok"], true);
        assert_eq!(v["loop_frequency"], 1000.0);
        assert_eq!(v["pid_gains"]["kp"], 0.6);
        assert_eq!(v["setpoint"], 0.0);
    }
}
