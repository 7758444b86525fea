//! Prelude module for common re-exports.
//!
//! Consumers can `use orbit_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{
    period_from_frequency, DEFAULT_CYCLE_TIME, DEFAULT_CYCLE_TIME_US, DEFAULT_LOOP_FREQUENCY_HZ,
    MAX_LOOP_FREQUENCY_HZ, MIN_LOOP_FREQUENCY_HZ,
};

// ─── Limits ─────────────────────────────────────────────────────────
pub use crate::limits::{GainBounds, Limits};

// ─── Telemetry ──────────────────────────────────────────────────────
pub use crate::ring::RingBuffer;
pub use crate::telemetry::{HealthFlags, TelemetrySample, TelemetryStats};

// ─── Atomics ────────────────────────────────────────────────────────
pub use crate::atomic::AtomicF64;
