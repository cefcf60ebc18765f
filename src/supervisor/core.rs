//! Subscription supervisor
//!
//! Owns the upstream subscription for the lifetime of the process:
//!
//! ```text
//!            connect + subscribe(Latest)
//! Starting ─────────────────────────────► Running
//!    ▲                                       │ tick: is_running() == false
//!    │   close subscription, close client    ▼
//!    └────────────────────────────────── Restarting
//! ```
//!
//! Restarts are unbounded and not delayed; a persistently failing upstream
//! is retried once per health-check interval. Each cycle owns its own
//! ticker, dropped before the next cycle starts, so health checks never
//! overlap and only one subscription is ever open.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;
use crate::stats::RelayMetrics;
use crate::upstream::{EventHandler, StartPosition, Subscription, UpstreamClient, UpstreamConnector};

use super::config::SupervisorConfig;

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Creating the client and subscription
    Starting,
    /// Subscription open, health checks ticking
    Running,
    /// Tearing down an unhealthy subscription
    Restarting,
    /// Shut down, subscription and client closed
    Stopped,
}

/// How a running cycle ended
enum CycleEnd {
    Unhealthy,
    Shutdown,
}

/// Keeps exactly one upstream subscription alive
pub struct Supervisor<C: UpstreamConnector> {
    connector: C,
    handler: Arc<dyn EventHandler>,
    config: SupervisorConfig,
    metrics: Arc<RelayMetrics>,
    state_tx: watch::Sender<SupervisorState>,
}

impl<C: UpstreamConnector> Supervisor<C> {
    /// Create a supervisor that delivers batches into `handler`
    pub fn new(connector: C, handler: Arc<dyn EventHandler>, config: SupervisorConfig) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Starting);

        Self {
            connector,
            handler,
            config,
            metrics: Arc::new(RelayMetrics::new()),
            state_tx,
        }
    }

    /// Share a metrics instance
    pub fn with_metrics(mut self, metrics: Arc<RelayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Run for the lifetime of the process
    ///
    /// Only returns if the upstream client cannot be constructed.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then close the live subscription
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.set_state(SupervisorState::Starting);

            let client = tokio::select! {
                _ = &mut shutdown => {
                    self.set_state(SupervisorState::Stopped);
                    return Ok(());
                }
                client = self.connector.connect() => client?,
            };
            let subscription = client.subscribe(Arc::clone(&self.handler), StartPosition::Latest);

            self.set_state(SupervisorState::Running);
            tracing::info!("Upstream subscription started");

            let end = tokio::select! {
                _ = &mut shutdown => CycleEnd::Shutdown,
                _ = self.watch_health(&subscription) => CycleEnd::Unhealthy,
            };

            match end {
                CycleEnd::Unhealthy => {
                    self.set_state(SupervisorState::Restarting);
                    tracing::warn!("Subscription is not running, attempting to restart");
                    Self::teardown(subscription, client).await;
                    self.metrics.restarted();
                }
                CycleEnd::Shutdown => {
                    tracing::info!("Stopping upstream subscription");
                    Self::teardown(subscription, client).await;
                    self.set_state(SupervisorState::Stopped);
                    return Ok(());
                }
            }
        }
    }

    /// Resolve on the first tick that finds the subscription not running
    async fn watch_health<S: Subscription>(&self, subscription: &S) {
        let period = self.config.health_check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !subscription.is_running() {
                return;
            }
        }
    }

    /// Close the subscription, then its client
    async fn teardown(subscription: <C::Client as UpstreamClient>::Subscription, client: C::Client) {
        if let Err(e) = subscription.close().await {
            tracing::warn!(error = %e, "Failed to close subscription");
        }
        if let Err(e) = client.close().await {
            tracing::warn!(error = %e, "Failed to close upstream client");
        }
    }

    fn set_state(&self, state: SupervisorState) {
        self.state_tx.send_replace(state);
        tracing::trace!(state = ?state, "Supervisor state");
    }
}
