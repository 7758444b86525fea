//! Transport interfaces consumed by the control loop, with bounded
//! in-process channel implementations.
//!
//! The loop treats telemetry as fire-and-forget: [`TelemetrySink::send_topic`]
//! must not block, and a saturated transport drops the frame. The command
//! side is polled once per cycle with a bounded timeout.

use crate::frame::{Frame, Topic};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// Non-blocking publisher for topic-tagged frames.
pub trait TelemetrySink {
    /// Publish on the default `telemetry` topic.
    fn send(&mut self, payload: &str) {
        self.send_topic(Topic::Telemetry, payload);
    }

    /// Publish on an explicit topic. Must never block; drop instead.
    fn send_topic(&mut self, topic: Topic, payload: &str);

    /// Frames dropped because the transport was saturated or gone.
    fn drop_count(&self) -> u64 {
        0
    }
}

/// Polled command server side: receive one request, send one reply.
pub trait CommandEndpoint {
    /// True if a request is waiting.
    fn has_request(&mut self) -> bool;

    /// Receive a pending request, waiting at most `timeout`.
    fn recv_timeout(&mut self, timeout: Duration) -> Option<String>;

    /// Send the reply for the most recently received request.
    fn reply(&mut self, response: &str);
}

/// Telemetry sink that discards every frame (benchmarks, tests).
#[derive(Debug, Default)]
pub struct NullTelemetry {
    sent: u64,
}

impl NullTelemetry {
    /// New discarding sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames accepted (and discarded).
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl TelemetrySink for NullTelemetry {
    fn send_topic(&mut self, _topic: Topic, _payload: &str) {
        self.sent += 1;
    }
}

/// Bounded channel-backed telemetry sink.
#[derive(Debug)]
pub struct ChannelTelemetry {
    tx: SyncSender<Frame>,
    drops: u64,
}

/// Create a bounded telemetry channel; the receiver side belongs to the
/// consumer thread (logger, bridge, test harness).
pub fn telemetry_channel(capacity: usize) -> (ChannelTelemetry, Receiver<Frame>) {
    let (tx, rx) = sync_channel(capacity);
    (ChannelTelemetry { tx, drops: 0 }, rx)
}

impl TelemetrySink for ChannelTelemetry {
    fn send_topic(&mut self, topic: Topic, payload: &str) {
        let frame = Frame {
            topic,
            payload: payload.to_string(),
        };
        match self.tx.try_send(frame) {
            Ok(()) => {}
            // Saturated or disconnected: drop rather than stall the loop.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.drops += 1;
            }
        }
    }

    fn drop_count(&self) -> u64 {
        self.drops
    }
}

/// Loop-side command endpoint over in-process channels.
#[derive(Debug)]
pub struct ChannelCommandServer {
    req_rx: Receiver<String>,
    resp_tx: SyncSender<String>,
    pending: Option<String>,
}

/// Client handle pairing with [`ChannelCommandServer`].
#[derive(Debug)]
pub struct ChannelCommandClient {
    req_tx: SyncSender<String>,
    resp_rx: Receiver<String>,
}

/// Create a connected command server/client pair.
pub fn command_channel() -> (ChannelCommandServer, ChannelCommandClient) {
    let (req_tx, req_rx) = sync_channel(16);
    let (resp_tx, resp_rx) = sync_channel(16);
    (
        ChannelCommandServer {
            req_rx,
            resp_tx,
            pending: None,
        },
        ChannelCommandClient { req_tx, resp_rx },
    )
}

impl CommandEndpoint for ChannelCommandServer {
    fn has_request(&mut self) -> bool {
        if self.pending.is_some() {
            return true;
        }
        if let Ok(req) = self.req_rx.try_recv() {
            self.pending = Some(req);
            return true;
        }
        false
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Option<String> {
        if let Some(req) = self.pending.take() {
            return Some(req);
        }
        match self.req_rx.recv_timeout(timeout) {
            Ok(req) => Some(req),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn reply(&mut self, response: &str) {
        // The client may have gone away; replies are best effort.
        let _ = self.resp_tx.try_send(response.to_string());
    }
}

impl ChannelCommandClient {
    /// Queue a request for the loop's next command poll.
    ///
    /// Returns false if the server side is gone or the queue is full.
    pub fn send(&self, command: &str) -> bool {
        self.req_tx.try_send(command.to_string()).is_ok()
    }

    /// Wait for a reply.
    pub fn recv_response(&self, timeout: Duration) -> Option<String> {
        self.resp_rx.recv_timeout(timeout).ok()
    }

    /// Send a request and wait for its reply.
    pub fn request(&self, command: &str, timeout: Duration) -> Option<String> {
        if !self.send(command) {
            return None;
        }
        self.recv_response(timeout)
    }
}
