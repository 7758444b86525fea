//! # Orbit IPC
//!
//! The command/telemetry boundary of the control loop:
//!
//! - [`frame`] — topic-tagged JSON telemetry frames. The `telemetry`
//!   topic carries one frame per cycle with the five required keys
//!   (`t`, `pos`, `intensity`, `mag`, `deadline_miss`); `alarm`, `error`
//!   and `status` carry event frames.
//! - [`codec`] — typed request/response codec for the JSON command
//!   channel (one request, one response).
//! - [`endpoint`] — the transport interfaces the loop consumes, plus
//!   bounded in-process channel implementations. The actual wire
//!   transport (sockets, buses) is a collaborator and lives outside this
//!   workspace; anything implementing [`endpoint::TelemetrySink`] and
//!   [`endpoint::CommandEndpoint`] plugs in.
//!
//! Telemetry publishing is non-blocking by contract: a saturated sink
//! drops frames and counts them rather than stalling the loop.

pub mod codec;
pub mod endpoint;
pub mod frame;

pub use codec::{
    decode_error_response, decode_request, error_response, ok_response, CommandRequest,
    DecodeError, PidGainsStatus, StatusSnapshot,
};
pub use endpoint::{
    command_channel, telemetry_channel, ChannelCommandClient, ChannelCommandServer,
    ChannelTelemetry, CommandEndpoint, NullTelemetry, TelemetrySink,
};
pub use frame::{
    frequency_reduced_frame, loop_error_frame, shutdown_frame, telemetry_frame, CycleFlags,
    Frame, Topic,
};
