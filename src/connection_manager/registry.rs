use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::relay::Identity;
use crate::websocket::OutboundMessage;

use super::{ConnectionHandle, ConnectionStats};

/// Tracks every live connection and its identity.
///
/// The registry only stores handles; it never writes to a transport itself.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new, not yet identified connection
    pub fn register(&self, sender: mpsc::UnboundedSender<OutboundMessage>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender));
        self.add(handle.clone());
        handle
    }

    /// Insert an existing handle, keyed by its id
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        let conn_id = handle.id;
        self.connections.insert(conn_id, handle);
        tracing::debug!(connection_id = %conn_id, "Connection registered");
    }

    /// Attach or overwrite the identity of a registered connection
    pub async fn set_identity(&self, connection_id: Uuid, identity: Identity) -> Result<(), RegistryError> {
        let handle = self
            .get(connection_id)
            .ok_or(RegistryError::NotFound(connection_id))?;
        handle.set_identity(identity).await;
        Ok(())
    }

    /// Remove a connection, returning its handle if it was registered
    pub fn remove(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let removed = self.connections.remove(&connection_id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Snapshot of all connections for iteration
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub async fn stats(&self) -> ConnectionStats {
        let mut stats = ConnectionStats {
            total_connections: self.connections.len(),
            ..Default::default()
        };

        for handle in self.all() {
            if let Some(identity) = handle.identity().await {
                stats.identified_connections += 1;
                if identity.is_operator {
                    stats.operators += 1;
                }
            }
        }

        stats
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_idle_connections(&self, timeout_secs: u64) -> Vec<Arc<ConnectionHandle>> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.value().clone())
            .collect()
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

    fn sender() -> mpsc::UnboundedSender<OutboundMessage> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[tokio::test]
    async fn test_register_starts_anonymous() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(sender());

        assert_eq!(registry.len(), 1);
        let found = registry.get(handle.id).expect("registered");
        assert!(found.identity().await.is_none());
    }

    #[tokio::test]
    async fn test_set_identity_overwrites() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(sender());

        registry
            .set_identity(handle.id, Identity::new("Alice", false))
            .await
            .unwrap();
        registry
            .set_identity(handle.id, Identity::new("Alice", true))
            .await
            .unwrap();

        let identity = handle.identity().await.unwrap();
        assert_eq!(identity.display_name, "Alice");
        assert!(identity.is_operator);
    }

    #[tokio::test]
    async fn test_set_identity_on_missing_connection() {
        let registry = ConnectionRegistry::new();
        let missing = Uuid::new_v4();

        let result = registry.set_identity(missing, Identity::new("Ghost", false)).await;
        assert_eq!(result, Err(RegistryError::NotFound(missing)));
    }

    #[test]
    fn test_remove() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(sender());

        assert!(registry.remove(handle.id).is_some());
        assert!(registry.remove(handle.id).is_none());
        assert!(registry.get(handle.id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = ConnectionRegistry::new();
        for _ in 0..50 {
            registry.register(sender());
        }
        assert_eq!(registry.all().len(), 50);
    }

    #[tokio::test]
    async fn test_stats() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(sender());
        let b = registry.register(sender());
        registry.register(sender());

        registry.set_identity(a.id, Identity::new("Alice", false)).await.unwrap();
        registry.set_identity(b.id, Identity::new("Bob", true)).await.unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.identified_connections, 2);
        assert_eq!(stats.operators, 1);
    }

    #[test]
    fn test_fresh_connections_are_not_idle() {
        let registry = ConnectionRegistry::new();
        registry.register(sender());
        assert!(registry.find_idle_connections(60).is_empty());
    }
}
