//! Upstream event source
//!
//! The relay consumes its upstream through three capability traits, so the
//! supervisor never depends on a concrete client library:
//!
//! - [`UpstreamConnector`] builds a fresh [`UpstreamClient`]
//! - [`UpstreamClient::subscribe`] starts delivery into an [`EventHandler`]
//!   and returns a [`Subscription`] handle
//! - [`Subscription::is_running`] is polled for health; `close` tears it down
//!
//! [`sse`] provides a Server-Sent-Events implementation.

pub mod error;
pub mod record;
pub mod sse;

use std::sync::Arc;

use async_trait::async_trait;

pub use error::UpstreamError;
pub use record::EventRecord;

/// Where a new subscription starts reading
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Only events published after the subscription opens
    #[default]
    Latest,
    /// Resume after the event with this id
    After(String),
}

/// Callbacks invoked by a running subscription
///
/// Batches are delivered one at a time, in upstream order; the next batch is
/// not delivered until `process_events` returns.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an ordered batch of records
    async fn process_events(&self, batch: Vec<EventRecord>);

    /// Handle an error reported during delivery
    async fn process_error(&self, error: UpstreamError);
}

/// Handle to a live upstream subscription
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Whether the subscription is still delivering
    fn is_running(&self) -> bool;

    /// Stop delivery and release the subscription
    async fn close(&self) -> Result<(), UpstreamError>;
}

/// A connected upstream client
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    type Subscription: Subscription;

    /// Start delivering events into `handler`
    fn subscribe(&self, handler: Arc<dyn EventHandler>, position: StartPosition) -> Self::Subscription;

    /// Close the client and anything it still owns
    async fn close(&self) -> Result<(), UpstreamError>;
}

/// Factory for upstream clients, called on start and on every restart
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    type Client: UpstreamClient;

    async fn connect(&self) -> Result<Self::Client, UpstreamError>;
}
