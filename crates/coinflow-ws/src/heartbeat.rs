//! Heartbeat management for the feed connection.
//!
//! A WebSocket ping goes out every `interval`; the matching pong must
//! arrive within `timeout` or the session is considered dead. Server
//! traffic does not postpone pings: the exchange keeps streaming data
//! even on a half-open socket, so only a pong proves liveness.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Lower bound for the check period.
const MIN_CHECK_PERIOD: Duration = Duration::from_millis(100);

/// Heartbeat state for one feed session.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// How often to send ping.
    interval: Duration,
    /// How long to wait for pong.
    timeout: Duration,
    /// Start of the current ping cycle (connect time or last ping).
    cycle_start: Instant,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    /// Last message received time (any message).
    last_message: Instant,
    waiting_for_pong: bool,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            timeout,
            cycle_start: now,
            last_ping: None,
            last_pong: None,
            last_message: now,
            waiting_for_pong: false,
        }
    }

    /// Reset heartbeat state (called on connection).
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.cycle_start = now;
        self.last_ping = None;
        self.last_pong = None;
        self.last_message = now;
        self.waiting_for_pong = false;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&mut self) {
        let now = Instant::now();
        self.cycle_start = now;
        self.last_ping = Some(now);
        self.waiting_for_pong = true;
    }

    /// Record that a pong was received.
    pub fn record_pong(&mut self) {
        let now = Instant::now();
        self.last_pong = Some(now);
        self.waiting_for_pong = false;

        if let Some(ping_time) = self.last_ping {
            let rtt_ms = now.duration_since(ping_time).as_millis() as u64;
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Record that any message was received.
    pub fn record_message(&mut self) {
        self.last_message = Instant::now();
    }

    /// Check if the outstanding ping has gone unanswered for too long.
    pub fn is_timed_out(&self) -> bool {
        if !self.waiting_for_pong {
            return false;
        }

        self.last_ping
            .is_some_and(|ping_time| ping_time.elapsed() > self.timeout)
    }

    /// Check if a ping is due.
    pub fn should_send_ping(&self) -> bool {
        !self.waiting_for_pong && self.cycle_start.elapsed() >= self.interval
    }

    /// How often the connection loop should evaluate the heartbeat.
    pub fn check_period(&self) -> Duration {
        (self.interval.min(self.timeout) / 4).max(MIN_CHECK_PERIOD)
    }

    /// Time since any message was received.
    pub fn time_since_last_message(&self) -> Duration {
        self.last_message.elapsed()
    }

    /// Get heartbeat statistics.
    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            waiting_for_pong: self.waiting_for_pong,
            ms_since_last_message: self.time_since_last_message().as_millis() as u64,
            ms_since_last_pong: self.last_pong.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatStats {
    pub waiting_for_pong: bool,
    pub ms_since_last_message: u64,
    pub ms_since_last_pong: Option<u64>,
}
