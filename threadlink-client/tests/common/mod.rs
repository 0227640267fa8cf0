//! Common test utilities for threadlink-client integration tests
//!
//! This module provides a mock thread server for testing client behavior
//! against a real WebSocket without needing the chat backend.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadlink_core::Origin;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Instruction for the live connections of the mock server
#[derive(Debug, Clone)]
enum Command {
    Push(String),
    Close(u16, String),
    Drop,
}

/// Mock thread server
///
/// Accepts any number of WebSocket connections, reports the request path of
/// each, records every text frame it receives, and can push frames to or
/// terminate the connections currently open.
pub struct MockThreadServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connection_rx: mpsc::UnboundedReceiver<String>,
    message_rx: mpsc::UnboundedReceiver<String>,
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<Command>>>>,
}

impl MockThreadServer {
    /// Start a new mock server on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (connection_tx, connection_rx) = mpsc::unbounded_channel::<String>();
        let (message_tx, message_rx) = mpsc::unbounded_channel::<String>();
        let peers: Arc<Mutex<Vec<mpsc::UnboundedSender<Command>>>> = Arc::default();
        let registered = peers.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let connection_tx = connection_tx.clone();
                        let message_tx = message_tx.clone();
                        let (command_tx, command_rx) = mpsc::unbounded_channel();
                        registered.lock().unwrap().push(command_tx);

                        tokio::spawn(serve(stream, connection_tx, message_tx, command_rx));
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connection_rx,
            message_rx,
            peers,
        }
    }

    /// Origin a client should use to reach this server
    pub fn origin(&self) -> Origin {
        Origin::insecure(self.addr.to_string())
    }

    /// Wait for the next accepted connection and return its request path
    pub async fn next_connection(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.connection_rx.recv()).await.ok().flatten()
    }

    /// Check for a connection accepted within `window`
    pub async fn connection_within(&mut self, window: Duration) -> Option<String> {
        tokio::time::timeout(window, self.connection_rx.recv()).await.ok().flatten()
    }

    /// Wait for a text frame from any client
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.message_rx.recv()).await.ok().flatten()
    }

    /// Check for a text frame received within `window`
    pub async fn message_within(&mut self, window: Duration) -> Option<String> {
        tokio::time::timeout(window, self.message_rx.recv()).await.ok().flatten()
    }

    /// Send a text frame to every open connection
    pub fn push(&self, text: impl Into<String>) {
        self.broadcast(Command::Push(text.into()));
    }

    /// Close every open connection with a close frame
    pub fn close_all(&self, code: u16, reason: &str) {
        self.broadcast(Command::Close(code, reason.to_string()));
    }

    /// Drop every open connection without a close handshake
    pub fn drop_all(&self) {
        self.broadcast(Command::Drop);
    }

    fn broadcast(&self, command: Command) {
        self.peers
            .lock()
            .unwrap()
            .retain(|peer| peer.send(command.clone()).is_ok());
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        self.drop_all();
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    connection_tx: mpsc::UnboundedSender<String>,
    message_tx: mpsc::UnboundedSender<String>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut path = String::new();
    let callback = |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    };
    let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let _ = connection_tx.send(path);

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(Command::Push(text)) => {
                    let _ = write.send(Message::Text(text)).await;
                }
                Some(Command::Close(code, reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    return;
                }
                Some(Command::Drop) | None => return,
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = message_tx.send(text);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
        }
    }
}

/// Receive the next value from a handler channel, failing after a timeout
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// An address nothing is listening on
pub async fn unused_origin() -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Origin::insecure(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_creation() {
        let server = MockThreadServer::start().await;
        assert!(server.origin().host().starts_with("127.0.0.1:"));
        assert!(!server.origin().is_secure());
        server.shutdown().await;
    }
}
