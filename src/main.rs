//! feed-relay binary
//!
//! Configuration comes from the environment (or a `.env` file):
//!
//! ```text
//! TCP_PORT=9000
//! CONNECTION_STRING="Endpoint=https://events.example.com;SharedAccessKey=..."
//! EVENT_HUB_NAME=telemetry
//! ```
//!
//! Then connect with any TCP client, e.g. `nc localhost 9000`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use feed_relay::registry::ConnectionRegistry;
use feed_relay::relay::{BroadcastSink, RelayHandler};
use feed_relay::stats::RelayMetrics;
use feed_relay::upstream::sse::SseConnector;
use feed_relay::{RelayConfig, RelayServer, Result, Supervisor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env()?;

    let metrics = Arc::new(RelayMetrics::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let server = RelayServer::with_registry(
        config.server.clone(),
        Arc::clone(&registry),
        Arc::clone(&metrics),
    );
    let sink = BroadcastSink::new(Arc::clone(&registry))
        .write_timeout(config.server.write_timeout)
        .with_metrics(Arc::clone(&metrics));
    let handler = Arc::new(RelayHandler::new(sink, Arc::clone(&metrics)));
    let supervisor = Supervisor::new(SseConnector::new(config.upstream), handler, config.supervisor)
        .with_metrics(Arc::clone(&metrics));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                // Keep the sender alive so the relay runs on
                std::future::pending::<()>().await;
            }
        }
    });

    tokio::try_join!(
        server.run_until(wait_for_shutdown(shutdown_rx.clone())),
        supervisor.run_until(wait_for_shutdown(shutdown_rx)),
    )?;

    let stats = metrics.snapshot(registry.len().await);
    tracing::info!(
        connections = stats.total_connections,
        frames = stats.frames_broadcast,
        records = stats.records_received,
        bytes = stats.bytes_sent,
        restarts = stats.restarts,
        uptime_secs = stats.uptime.as_secs(),
        "Relay stopped"
    );

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
