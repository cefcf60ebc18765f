//! Relay TCP server
//!
//! Accepts plain TCP clients and keeps the connection registry in sync with
//! who is connected.

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
