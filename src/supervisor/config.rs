//! Supervisor configuration

use std::time::Duration;

/// Default health-check period
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Supervisor configuration options
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often the subscription's running flag is polled
    pub health_check_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }
}

impl SupervisorConfig {
    /// Set the health-check interval
    ///
    /// A zero interval is bumped to one millisecond.
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval.max(Duration::from_millis(1));
        self
    }
}
