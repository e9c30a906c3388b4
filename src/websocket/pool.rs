use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;
use tracing::info;

/// What the pool knows about a live session.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub peer_addr: String,
    pub connected_at: DateTime<Utc>,
}

/// Registry of live connections. Sessions never read from it; it only
/// records who is connected for health reporting and logs.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: Arc<RwLock<HashMap<Uuid, ConnectionInfo>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add(&self, id: Uuid, peer_addr: String) {
        let info = ConnectionInfo {
            id,
            peer_addr,
            connected_at: Utc::now(),
        };
        self.connections.write().await.insert(id, info);
        info!("Added connection {} to pool", id);
    }

    /// Unregisters a connection, returning what was recorded for it.
    pub async fn remove(&self, id: &Uuid) -> Option<ConnectionInfo> {
        let removed = self.connections.write().await.remove(id);
        if removed.is_some() {
            info!("Removed connection {} from pool", id);
        }
        removed
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn get_all_connection_ids(&self) -> Vec<Uuid> {
        self.connections.read().await.keys().cloned().collect()
    }
}
