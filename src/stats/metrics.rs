//! Statistics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Relay-wide counters, updated from the listener, sink and supervisor
#[derive(Debug)]
pub struct RelayMetrics {
    started_at: Instant,
    total_connections: AtomicU64,
    frames_broadcast: AtomicU64,
    records_received: AtomicU64,
    bytes_sent: AtomicU64,
    write_failures: AtomicU64,
    upstream_errors: AtomicU64,
    restarts: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            frames_broadcast: AtomicU64::new(0),
            records_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            upstream_errors: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    pub fn connection_accepted(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch of `records` records received from upstream
    pub fn batch_received(&self, records: usize) {
        self.records_received
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Record a frame delivered to at least one client
    pub fn frame_broadcast(&self) {
        self.frames_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn restarted(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters
    ///
    /// `active_connections` is not tracked here; pass the registry size.
    pub fn snapshot(&self, active_connections: usize) -> RelayStats {
        RelayStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: active_connections as u64,
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            records_received: self.records_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of relay statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Currently registered connections
    pub active_connections: u64,
    /// Frames delivered to at least one client
    pub frames_broadcast: u64,
    /// Records received from upstream
    pub records_received: u64,
    /// Total bytes written to clients
    pub bytes_sent: u64,
    /// Client writes that failed or timed out
    pub write_failures: u64,
    /// Errors reported by the upstream subscription
    pub upstream_errors: u64,
    /// Subscription restarts
    pub restarts: u64,
    /// Uptime
    pub uptime: Duration,
}
