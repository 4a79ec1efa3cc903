//! Streaming feed connection for coinflow.
//!
//! Provides the upstream WebSocket lifecycle:
//! - Fixed-cooldown infinite reconnection (Disconnected -> Connecting -> Connected)
//! - Heartbeat monitoring (15s ping, 10s pong timeout)
//! - Sequential frame delivery to a [`FrameHandler`] on the caller's task

pub mod connection;
pub mod error;
pub mod heartbeat;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, FrameHandler};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatManager;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the ring provider for rustls.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_crypto_installs_provider_once() {
        init_crypto();
        init_crypto();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
