//! Relay server listener
//!
//! Handles the TCP accept loop, registers each client and spawns a task that
//! watches it for disconnects.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::registry::{endpoint_id, ClientConnection, ConnectionRegistry};
use crate::server::config::ServerConfig;
use crate::stats::RelayMetrics;

/// TCP server that feeds the connection registry
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<RelayMetrics>,
    next_session_id: AtomicU64,
}

impl RelayServer {
    /// Create a new server with its own registry
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(
            config,
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RelayMetrics::new()),
        )
    }

    /// Create a new server around a shared registry
    pub fn with_registry(
        config: ServerConfig,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            metrics,
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.accept_loop(&listener) => {}
        }

        Ok(())
    }

    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    self.handle_connection(socket).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, socket: TcpStream) {
        // Peer may have gone away between accept and here
        let peer_addr = match socket.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::debug!(error = %e, "Peer address unavailable, dropping connection");
                return;
            }
        };

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
            return;
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let id = endpoint_id(&peer_addr);
        let (reader, writer) = socket.into_split();
        let connection = Arc::new(ClientConnection::new(id, session_id, Box::new(writer)));

        // Closing waits on any write still in flight to the replaced entry
        if let Some(replaced) = self.registry.insert(Arc::clone(&connection)).await {
            tokio::spawn(async move { replaced.close().await });
        }
        self.metrics.connection_accepted();

        tracing::info!(
            peer = %connection.id(),
            session_id = session_id,
            "Client connected"
        );

        let registry = Arc::clone(&self.registry);
        let buffer_size = self.config.read_buffer_size.max(1);
        tokio::spawn(watch_connection(reader, connection, registry, buffer_size));
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

/// Watch a client until it disconnects, errors, or is closed locally
///
/// Inbound bytes are drained and discarded. Whichever way the connection
/// ends, it is deregistered and closed exactly once.
async fn watch_connection<R>(
    mut reader: R,
    connection: Arc<ClientConnection>,
    registry: Arc<ConnectionRegistry>,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        tokio::select! {
            _ = connection.closed() => {
                tracing::debug!(
                    peer = %connection.id(),
                    session_id = connection.session_id(),
                    "Client closed locally"
                );
                break;
            }
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::info!(peer = %connection.id(), "Client disconnected");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(peer = %connection.id(), error = %e, "Client connection error");
                    break;
                }
            }
        }
    }

    registry
        .remove_session(connection.id(), connection.session_id())
        .await;
    connection.close().await;
}
