//! Broadcast sink
//!
//! Writes a frame to every registered connection. Writes run concurrently
//! and each is bounded by a timeout; a connection whose write fails or times
//! out is deregistered and closed. Failures never reach the caller.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::registry::{ClientConnection, ConnectionRegistry};
use crate::stats::RelayMetrics;

/// Default per-connection write timeout
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fans frames out to the connection registry
#[derive(Clone)]
pub struct BroadcastSink {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
    metrics: Arc<RelayMetrics>,
}

enum WriteOutcome {
    Delivered,
    /// Connection was already closed by its own teardown
    AlreadyClosed,
    Failed(io::Error),
    TimedOut,
}

impl BroadcastSink {
    /// Create a sink over `registry`
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    /// Set the per-connection write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Share a metrics instance
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Write `frame` to every registered connection
    ///
    /// Returns the number of connections the frame was delivered to.
    pub async fn broadcast(&self, frame: &[u8]) -> usize {
        if frame.is_empty() {
            return 0;
        }

        let connections = self.registry.snapshot().await;
        if connections.is_empty() {
            return 0;
        }

        let writes = connections.iter().map(|conn| self.write_one(conn, frame));
        let outcomes = join_all(writes).await;

        let mut delivered = 0;
        for (conn, outcome) in connections.iter().zip(outcomes) {
            match outcome {
                WriteOutcome::Delivered => {
                    delivered += 1;
                    self.metrics.bytes_sent(frame.len());
                }
                WriteOutcome::AlreadyClosed => {
                    self.registry
                        .remove_session(conn.id(), conn.session_id())
                        .await;
                }
                WriteOutcome::Failed(e) => {
                    tracing::warn!(peer = %conn.id(), error = %e, "Write failed, dropping client");
                    self.drop_connection(conn).await;
                }
                WriteOutcome::TimedOut => {
                    tracing::warn!(
                        peer = %conn.id(),
                        timeout_ms = self.write_timeout.as_millis() as u64,
                        "Write timed out, dropping client"
                    );
                    self.drop_connection(conn).await;
                }
            }
        }

        tracing::trace!(
            bytes = frame.len(),
            clients = connections.len(),
            delivered = delivered,
            "Frame broadcast"
        );

        delivered
    }

    async fn write_one(&self, conn: &ClientConnection, frame: &[u8]) -> WriteOutcome {
        match tokio::time::timeout(self.write_timeout, conn.write_frame(frame)).await {
            Ok(Ok(())) => WriteOutcome::Delivered,
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotConnected => WriteOutcome::AlreadyClosed,
            Ok(Err(e)) => WriteOutcome::Failed(e),
            Err(_) => WriteOutcome::TimedOut,
        }
    }

    async fn drop_connection(&self, conn: &Arc<ClientConnection>) {
        self.metrics.write_failed();
        self.registry
            .remove_session(conn.id(), conn.session_id())
            .await;
        conn.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::AsyncWrite;
    use tokio_test::io::Builder;

    use super::*;

    fn mock_connection(id: &str, session_id: u64, mock: tokio_test::io::Mock) -> Arc<ClientConnection> {
        Arc::new(ClientConnection::new(id, session_id, Box::new(mock)))
    }

    /// Writer that never completes a write
    struct StalledWriter;

    impl AsyncWrite for StalledWriter {
        fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_broadcast_to_all() {
        let registry = Arc::new(ConnectionRegistry::new());
        registry
            .insert(mock_connection("127.0.0.1:1", 1, Builder::new().write(b"hello\r\n").build()))
            .await;
        registry
            .insert(mock_connection("127.0.0.1:2", 2, Builder::new().write(b"hello\r\n").build()))
            .await;

        let sink = BroadcastSink::new(registry.clone());
        assert_eq!(sink.broadcast(b"hello\r\n").await, 2);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_write_removes_only_that_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let failing = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        registry.insert(mock_connection("127.0.0.1:1", 1, failing)).await;
        registry
            .insert(mock_connection("127.0.0.1:2", 2, Builder::new().write(b"frame\r\n").build()))
            .await;

        let metrics = Arc::new(RelayMetrics::new());
        let sink = BroadcastSink::new(registry.clone()).with_metrics(metrics.clone());

        assert_eq!(sink.broadcast(b"frame\r\n").await, 1);
        assert!(!registry.contains("127.0.0.1:1").await);
        assert!(registry.contains("127.0.0.1:2").await);

        let stats = metrics.snapshot(registry.len().await);
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.bytes_sent, 7);
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        let registry = Arc::new(ConnectionRegistry::new());
        registry
            .insert(Arc::new(ClientConnection::new("127.0.0.1:1", 1, Box::new(StalledWriter))))
            .await;
        registry
            .insert(mock_connection("127.0.0.1:2", 2, Builder::new().write(b"x\r\n").build()))
            .await;

        let sink = BroadcastSink::new(registry.clone()).write_timeout(Duration::from_millis(50));

        assert_eq!(sink.broadcast(b"x\r\n").await, 1);
        assert!(!registry.contains("127.0.0.1:1").await);
        assert!(registry.contains("127.0.0.1:2").await);
    }

    #[tokio::test]
    async fn test_closed_connection_removed_quietly() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (client, _server) = tokio::io::duplex(64);
        let conn = Arc::new(ClientConnection::new("127.0.0.1:1", 1, Box::new(client)));
        registry.insert(conn.clone()).await;
        conn.close().await;

        let metrics = Arc::new(RelayMetrics::new());
        let sink = BroadcastSink::new(registry.clone()).with_metrics(metrics.clone());

        assert_eq!(sink.broadcast(b"x\r\n").await, 0);
        assert!(registry.is_empty().await);
        assert_eq!(metrics.snapshot(0).write_failures, 0);
    }

    #[tokio::test]
    async fn test_empty_frame_is_noop() {
        let registry = Arc::new(ConnectionRegistry::new());
        // Mock with no expectations fails on any write
        registry
            .insert(mock_connection("127.0.0.1:1", 1, Builder::new().build()))
            .await;

        let sink = BroadcastSink::new(registry.clone());
        assert_eq!(sink.broadcast(b"").await, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_no_connections() {
        let sink = BroadcastSink::new(Arc::new(ConnectionRegistry::new()));
        assert_eq!(sink.broadcast(b"x\r\n").await, 0);
    }
}
