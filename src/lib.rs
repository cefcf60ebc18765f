//! # feed-relay
//!
//! Relays an upstream event stream to plain TCP clients.
//!
//! Records arriving from the upstream subscription are folded into one text
//! frame per batch (each record body followed by CRLF) and written to every
//! connected client. A supervisor polls the subscription's health and
//! transparently replaces it when it stops running.
//!
//! ```text
//!  upstream ──► Supervisor ──► RelayHandler ──► BroadcastSink ──► clients
//!                                                     ▲
//!                 RelayServer ──► ConnectionRegistry ─┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use feed_relay::config::RelayConfig;
//! use feed_relay::registry::ConnectionRegistry;
//! use feed_relay::relay::{BroadcastSink, RelayHandler};
//! use feed_relay::server::RelayServer;
//! use feed_relay::stats::RelayMetrics;
//! use feed_relay::supervisor::Supervisor;
//! use feed_relay::upstream::sse::SseConnector;
//!
//! # async fn example() -> feed_relay::Result<()> {
//! let config = RelayConfig::from_env()?;
//! let metrics = Arc::new(RelayMetrics::new());
//! let registry = Arc::new(ConnectionRegistry::new());
//!
//! let server = RelayServer::with_registry(config.server.clone(), registry.clone(), metrics.clone());
//! let sink = BroadcastSink::new(registry).write_timeout(config.server.write_timeout);
//! let handler = Arc::new(RelayHandler::new(sink, metrics.clone()));
//! let supervisor = Supervisor::new(SseConnector::new(config.upstream), handler, config.supervisor);
//!
//! tokio::try_join!(server.run(), supervisor.run())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod stats;
pub mod supervisor;
pub mod upstream;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use registry::ConnectionRegistry;
pub use server::{RelayServer, ServerConfig};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState};
