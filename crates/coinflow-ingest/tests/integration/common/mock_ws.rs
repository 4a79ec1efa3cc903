//! Mock ticker feed for integration tests.
//!
//! Accepts WebSocket clients and lets the test push text frames to the
//! most recent one, close it with a Close frame, or drop the TCP stream.
//! An unresponsive server completes the handshake and then never reads,
//! so client pings go unanswered.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

enum Command {
    Send(String),
    Close,
    Drop,
}

type CommandSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>;

/// A mock WebSocket feed server.
pub struct MockFeedServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connections: Arc<AtomicU32>,
    current: CommandSlot,
}

impl MockFeedServer {
    /// Start on an available local port.
    pub async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Start a server that never reads after the handshake.
    pub async fn start_unresponsive() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(responsive: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let current: CommandSlot = Arc::new(Mutex::new(None));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let connections_clone = connections.clone();
        let current_clone = current.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        if responsive {
                            tokio::spawn(handle_connection(
                                stream,
                                connections_clone.clone(),
                                current_clone.clone(),
                            ));
                        } else {
                            tokio::spawn(hold_connection(stream, connections_clone.clone()));
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connections,
            current,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Completed handshakes so far.
    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` clients have connected.
    pub async fn wait_for_connections(&self, n: u32, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.connection_count() < n {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Send a text frame to the latest client.
    pub async fn push(&self, frame: impl Into<String>) {
        self.command(Command::Send(frame.into())).await;
    }

    /// Close the latest client with a Close frame.
    pub async fn close_connection(&self) {
        self.command(Command::Close).await;
    }

    /// Drop the latest client's TCP stream without a closing handshake.
    pub async fn drop_connection(&self) {
        self.command(Command::Drop).await;
    }

    async fn command(&self, command: Command) {
        if let Some(tx) = self.current.lock().await.as_ref() {
            let _ = tx.send(command);
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(stream: TcpStream, connections: Arc<AtomicU32>, current: CommandSlot) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    *current.lock().await = Some(tx);
    connections.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Send(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Command::Close) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Some(Command::Drop) | None => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}

/// Keep the socket open without polling it.
async fn hold_connection(stream: TcpStream, connections: Arc<AtomicU32>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    connections.fetch_add(1, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(30)).await;
    drop(ws_stream);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockFeedServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        assert_eq!(server.connection_count(), 0);
        server.shutdown().await;
    }
}
