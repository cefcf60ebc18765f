//! Connection registry implementation
//!
//! The central map of live client connections, keyed by endpoint identity.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::connection::ClientConnection;

/// Registry of live client connections
///
/// Thread-safe via `RwLock`. No lock is held across socket I/O: callers that
/// write take a [`snapshot`](Self::snapshot) and write outside the lock.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a connection under its endpoint identity
    ///
    /// Replaces any existing entry with the same identity and returns it.
    pub async fn insert(&self, connection: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        let mut connections = self.connections.write().await;
        let replaced = connections.insert(connection.id().to_string(), connection);

        if let Some(ref old) = replaced {
            tracing::debug!(
                peer = %old.id(),
                session_id = old.session_id(),
                "Connection replaced by newer session"
            );
        }

        replaced
    }

    /// Remove the entry for `id`, if any
    pub async fn remove(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.write().await.remove(id)
    }

    /// Remove the entry for `id` only if it still belongs to `session_id`
    ///
    /// Used by a connection's own teardown so it cannot deregister a newer
    /// connection that reused the same identity.
    pub async fn remove_session(&self, id: &str, session_id: u64) -> Option<Arc<ClientConnection>> {
        let mut connections = self.connections.write().await;

        match connections.get(id) {
            Some(conn) if conn.session_id() == session_id => connections.remove(id),
            _ => None,
        }
    }

    /// Get the connection registered under `id`
    pub async fn get(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Check if `id` is registered
    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Invoke `f` once per connection registered at the time of the call
    ///
    /// Iteration order is unspecified. The read lock is held while `f` runs,
    /// so `f` must not call back into the registry.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<ClientConnection>),
    {
        let connections = self.connections.read().await;
        for conn in connections.values() {
            f(conn);
        }
    }

    /// Clone out the currently registered connections
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(id: &str, session_id: u64) -> Arc<ClientConnection> {
        let (client, _server) = tokio::io::duplex(64);
        Arc::new(ClientConnection::new(id, session_id, Box::new(client)))
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = ConnectionRegistry::new();

        assert!(registry.insert(connection("127.0.0.1:1000", 1)).await.is_none());
        assert!(registry.contains("127.0.0.1:1000").await);
        assert_eq!(registry.len().await, 1);

        let removed = registry.remove("127.0.0.1:1000").await.unwrap();
        assert_eq!(removed.session_id(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_same_identity_last_wins() {
        let registry = ConnectionRegistry::new();

        registry.insert(connection("127.0.0.1:1000", 1)).await;
        let replaced = registry.insert(connection("127.0.0.1:1000", 2)).await;

        assert_eq!(replaced.unwrap().session_id(), 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("127.0.0.1:1000").await.unwrap().session_id(), 2);
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.insert(connection("127.0.0.1:1000", 1)).await;

        assert!(registry.remove("127.0.0.1:2000").await.is_none());
        assert!(registry.remove("127.0.0.1:2000").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_session_ignores_newer_connection() {
        let registry = ConnectionRegistry::new();

        registry.insert(connection("127.0.0.1:1000", 1)).await;
        registry.insert(connection("127.0.0.1:1000", 2)).await;

        // Teardown of the replaced session leaves the new one alone
        assert!(registry.remove_session("127.0.0.1:1000", 1).await.is_none());
        assert!(registry.contains("127.0.0.1:1000").await);

        assert!(registry.remove_session("127.0.0.1:1000", 2).await.is_some());
        assert!(!registry.contains("127.0.0.1:1000").await);
    }

    #[tokio::test]
    async fn test_for_each_visits_every_connection() {
        let registry = ConnectionRegistry::new();
        registry.insert(connection("127.0.0.1:1000", 1)).await;
        registry.insert(connection("127.0.0.1:1001", 2)).await;
        registry.insert(connection("127.0.0.1:1002", 3)).await;

        let mut seen = Vec::new();
        registry.for_each(|conn| seen.push(conn.session_id())).await;
        seen.sort_unstable();

        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = ConnectionRegistry::new();
        registry.insert(connection("127.0.0.1:1000", 1)).await;

        let snapshot = registry.snapshot().await;
        registry.remove("127.0.0.1:1000").await;

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty().await);
    }
}
