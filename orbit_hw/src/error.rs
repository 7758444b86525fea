//! Hardware error taxonomy.
//!
//! Sensor and actuator failures keep their device-level classification all
//! the way to the telemetry boundary; nothing collapses into a generic
//! error string until serialization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sensor failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorError {
    /// Read operation timed out.
    #[error("read operation timed out")]
    Timeout,
    /// Communication with hardware failed.
    #[error("communication with hardware failed")]
    Communication,
    /// Reading is outside the valid range.
    #[error("reading outside valid range")]
    OutOfRange,
    /// Sensor calibration is invalid.
    #[error("sensor calibration invalid")]
    Calibration,
    /// Hardware malfunction detected.
    #[error("hardware fault detected")]
    HardwareFault,
    /// Sensor not properly initialized.
    #[error("sensor not initialized")]
    NotInitialized,
    /// Unspecified error condition.
    #[error("unknown sensor error")]
    Unknown,
}

impl SensorError {
    /// Stable wire/display name for telemetry and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Communication => "COMMUNICATION_ERROR",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Calibration => "CALIBRATION_ERROR",
            Self::HardwareFault => "HARDWARE_FAULT",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

/// Actuator failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActuatorError {
    /// Commanded value outside the safe range.
    #[error("commanded value outside safe range")]
    OutOfRange,
    /// Rate of change too high.
    #[error("rate of change exceeds limit")]
    RateLimit,
    /// Communication with hardware failed.
    #[error("communication with hardware failed")]
    Communication,
    /// Hardware malfunction detected.
    #[error("hardware fault detected")]
    HardwareFault,
    /// Safety system preventing operation.
    #[error("safety interlock active")]
    Interlock,
    /// Power supply or amplifier fault.
    #[error("power supply fault")]
    PowerFault,
    /// Thermal protection triggered.
    #[error("overtemperature protection triggered")]
    OverTemperature,
    /// Actuator not properly initialized.
    #[error("actuator not initialized")]
    NotInitialized,
    /// Unspecified error condition.
    #[error("unknown actuator error")]
    Unknown,
}

impl ActuatorError {
    /// Stable wire/display name for telemetry and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::RateLimit => "RATE_LIMIT_EXCEEDED",
            Self::Communication => "COMMUNICATION_ERROR",
            Self::HardwareFault => "HARDWARE_FAULT",
            Self::Interlock => "SAFETY_INTERLOCK",
            Self::PowerFault => "POWER_FAULT",
            Self::OverTemperature => "OVERTEMPERATURE",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// True for faults the control loop treats as non-fatal: the command
    /// is rejected but the loop neither latches emergency stop nor halts.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfRange | Self::RateLimit)
    }
}
