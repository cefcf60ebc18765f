//! Client connection handle
//!
//! One accepted TCP client as seen by the registry: its endpoint identity
//! and the write side of its socket.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};

/// Boxed write half of a client socket
pub type ConnectionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Build the registry key for a peer address (`<address>:<port>`)
pub fn endpoint_id(addr: &SocketAddr) -> String {
    format!("{}:{}", addr.ip(), addr.port())
}

/// A registered client connection
///
/// Writes are serialised through an async mutex so a frame is always written
/// contiguously to a given client.
pub struct ClientConnection {
    /// Endpoint identity (`address:port`), the registry key
    id: String,

    /// Unique session ID, distinguishes connections that reuse an identity
    session_id: u64,

    writer: Mutex<Option<ConnectionWriter>>,

    /// Signalled once when the connection is closed locally
    closed: Notify,
}

impl ClientConnection {
    /// Create a new connection around a writer
    pub fn new(id: impl Into<String>, session_id: u64, writer: ConnectionWriter) -> Self {
        Self {
            id: id.into(),
            session_id,
            writer: Mutex::new(Some(writer)),
            closed: Notify::new(),
        }
    }

    /// Endpoint identity
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Write a complete frame and flush it
    ///
    /// Fails with `NotConnected` once the connection has been closed.
    pub async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        writer.write_all(frame).await?;
        writer.flush().await
    }

    /// Close the connection
    ///
    /// Shuts down the write side and wakes the connection's reader task.
    /// Idempotent.
    pub async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            // Peer may already be gone
            let _ = writer.shutdown().await;
            self.closed.notify_one();
        }
    }

    /// Resolve once `close` has been called
    pub async fn closed(&self) {
        self.closed.notified().await
    }

    /// Check whether the connection has been closed locally
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_endpoint_id_v4() {
        let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
        assert_eq!(endpoint_id(&addr), "10.0.0.7:51234");
    }

    #[test]
    fn test_endpoint_id_v6_has_no_brackets() {
        let addr: SocketAddr = "[::1]:4000".parse().unwrap();
        assert_eq!(endpoint_id(&addr), "::1:4000");
    }

    #[tokio::test]
    async fn test_write_frame() {
        let mock = Builder::new().write(b"hello\r\n").build();
        let conn = ClientConnection::new("127.0.0.1:1", 1, Box::new(mock));

        conn.write_frame(b"hello\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (client, _server) = tokio::io::duplex(64);
        let conn = ClientConnection::new("127.0.0.1:1", 1, Box::new(client));

        conn.close().await;
        assert!(conn.is_closed().await);

        let err = conn.write_frame(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_close_wakes_waiter() {
        let (client, _server) = tokio::io::duplex(64);
        let conn = std::sync::Arc::new(ClientConnection::new("127.0.0.1:1", 1, Box::new(client)));

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };

        conn.close().await;
        // Second close is a no-op
        conn.close().await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
