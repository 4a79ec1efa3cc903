//! Feed connection supervisor.
//!
//! Owns the upstream WebSocket lifecycle and hands every text frame to a
//! [`FrameHandler`] on the same task, so frame processing (including any
//! flush the handler performs) never overlaps with reading the next frame.
//!
//! Reconnection uses a fixed cooldown and never gives up. This is
//! intentionally different from the store's bounded exponential backoff:
//! the feed is the process's reason to exist, so it retries forever at a
//! steady pace instead of backing off into long silent gaps.

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Binance all-market 24h ticker stream.
pub const DEFAULT_FEED_URL: &str = "wss://stream.binance.com:9443/ws/!ticker@arr";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Heartbeat interval (ping every this often).
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout (pong must arrive within this).
    pub heartbeat_timeout_ms: u64,
    /// Fixed cooldown between a disconnect and the next connect attempt.
    pub reconnect_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 10_000,
            reconnect_delay_ms: 5_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Receiver of feed frames.
///
/// `on_frame` is awaited to completion before the next frame is read.
pub trait FrameHandler {
    /// Process one raw text frame.
    fn on_frame(&mut self, frame: &str) -> impl Future<Output = ()> + Send;

    /// Called on every state transition.
    fn on_state_change(&mut self, _state: ConnectionState) {}

    /// Called once per failed session with the error that ended it.
    fn on_disconnect(&mut self, _error: &WsError) {}
}

/// Feed connection supervisor.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    heartbeat: HeartbeatManager,
    /// Consecutive failed sessions since the last successful connect.
    reconnect_count: u32,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(config: ConnectionConfig) -> Self {
        let heartbeat = HeartbeatManager::new(
            Duration::from_millis(config.heartbeat_interval_ms),
            Duration::from_millis(config.heartbeat_timeout_ms),
        );
        Self {
            config,
            state: ConnectionState::Disconnected,
            heartbeat,
            reconnect_count: 0,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    /// Token that stops the supervisor when cancelled.
    ///
    /// Clone it into a signal handler; cancelling closes the live session
    /// with a Close frame and makes [`run`](Self::run) return.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Run the connect / receive / reconnect loop until shutdown.
    pub async fn run<H: FrameHandler>(&mut self, handler: &mut H) {
        let cooldown = Duration::from_millis(self.config.reconnect_delay_ms);

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                self.set_state(ConnectionState::Disconnected, handler);
                return;
            }

            self.set_state(ConnectionState::Connecting, handler);

            match self.run_session(handler).await {
                Ok(()) => info!("Feed session closed"),
                Err(e) => {
                    error!(error = %e, "Feed connection error");
                    handler.on_disconnect(&e);
                }
            }

            self.set_state(ConnectionState::Disconnected, handler);

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                return;
            }

            self.reconnect_count = self.reconnect_count.saturating_add(1);
            warn!(
                attempt = self.reconnect_count,
                delay_ms = self.config.reconnect_delay_ms,
                "Reconnecting to feed after cooldown"
            );

            tokio::select! {
                () = tokio::time::sleep(cooldown) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during cooldown, exiting");
                    return;
                }
            }
        }
    }

    fn set_state<H: FrameHandler>(&mut self, state: ConnectionState, handler: &mut H) {
        if self.state != state {
            debug!(from = self.state.as_str(), to = state.as_str(), "Feed state change");
            self.state = state;
            handler.on_state_change(state);
        }
    }

    /// One connected session. Returns `Ok` only on requested shutdown.
    async fn run_session<H: FrameHandler>(&mut self, handler: &mut H) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to feed");

        // TCP_NODELAY: frames are small and latency-sensitive
        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Connected, handler);
        self.reconnect_count = 0;
        self.heartbeat.reset();
        info!("Feed connected");

        let mut heartbeat_check = tokio::time::interval(self.heartbeat.check_period());
        heartbeat_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        heartbeat_check.tick().await;

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_message();
                            handler.on_frame(&text).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            self.heartbeat.record_message();
                            debug!("Ignoring binary frame");
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Feed closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                    }
                }

                _ = heartbeat_check.tick() => {
                    if self.heartbeat.is_timed_out() {
                        let stats = self.heartbeat.stats();
                        error!(
                            ms_since_last_message = stats.ms_since_last_message,
                            ms_since_last_pong = ?stats.ms_since_last_pong,
                            "Heartbeat timeout"
                        );
                        return Err(WsError::HeartbeatTimeout);
                    }

                    if self.heartbeat.should_send_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }
}
