//! Upstream-to-client bridge

use std::sync::Arc;

use async_trait::async_trait;

use crate::stats::RelayMetrics;
use crate::upstream::{EventHandler, EventRecord, UpstreamError};

use super::format::format_batch;
use super::sink::BroadcastSink;

/// [`EventHandler`] that formats each batch and broadcasts it
pub struct RelayHandler {
    sink: BroadcastSink,
    metrics: Arc<RelayMetrics>,
}

impl RelayHandler {
    pub fn new(sink: BroadcastSink, metrics: Arc<RelayMetrics>) -> Self {
        Self { sink, metrics }
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn process_events(&self, batch: Vec<EventRecord>) {
        let frame = format_batch(&batch);
        self.metrics.batch_received(batch.len());

        let delivered = self.sink.broadcast(frame.as_bytes()).await;
        if delivered > 0 {
            self.metrics.frame_broadcast();
        }
        tracing::debug!(
            records = batch.len(),
            delivered = delivered,
            last_id = batch.last().and_then(|r| r.id.as_deref()).unwrap_or(""),
            "Batch relayed"
        );
    }

    async fn process_error(&self, error: UpstreamError) {
        self.metrics.upstream_error();
        tracing::error!(error = %error, "Upstream delivery error");
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::registry::{ClientConnection, ConnectionRegistry};

    #[tokio::test]
    async fn test_batches_reach_client_in_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mock = Builder::new()
            .write(b"hello\r\n")
            .write(b"world\r\n!\r\n")
            .build();
        registry
            .insert(Arc::new(ClientConnection::new("127.0.0.1:1", 1, Box::new(mock))))
            .await;

        let metrics = Arc::new(RelayMetrics::new());
        let handler = RelayHandler::new(BroadcastSink::new(registry.clone()), metrics.clone());

        handler.process_events(vec!["hello".into()]).await;
        handler
            .process_events(vec!["world".into(), "!".into()])
            .await;

        let stats = metrics.snapshot(registry.len().await);
        assert_eq!(stats.frames_broadcast, 2);
        assert_eq!(stats.records_received, 3);
        assert_eq!(stats.active_connections, 1);
    }

    #[tokio::test]
    async fn test_undelivered_frames_are_not_counted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let handler = RelayHandler::new(BroadcastSink::new(registry), metrics.clone());

        handler.process_events(vec!["nobody listening".into()]).await;
        handler.process_events(Vec::new()).await;

        let stats = metrics.snapshot(0);
        assert_eq!(stats.frames_broadcast, 0);
        assert_eq!(stats.records_received, 1);
    }

    #[tokio::test]
    async fn test_errors_are_only_counted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let handler = RelayHandler::new(BroadcastSink::new(registry), metrics.clone());

        handler.process_error(UpstreamError::Status(503)).await;

        assert_eq!(metrics.snapshot(0).upstream_errors, 1);
    }
}
