use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Per-user outbound channels, used by the notification fanout.
///
/// Room fanout goes through the room registry instead; this map only
/// answers "does this user have an open live channel right now".
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn register(&self, user_id: String, sender: mpsc::UnboundedSender<String>);

    async fn unregister(&self, user_id: &str);

    /// Attempts live delivery; false means the user is offline
    async fn send_to_user(&self, user_id: &str, message: &str) -> bool;
}

pub struct InMemoryConnectionManager {
    // user_id -> sender; a reconnect replaces the previous channel
    connections: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<String>>>>,
}

impl Default for InMemoryConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ConnectionManager for InMemoryConnectionManager {
    async fn register(&self, user_id: String, sender: mpsc::UnboundedSender<String>) {
        let mut connections = self.connections.write().await;
        connections.insert(user_id, sender);
    }

    async fn unregister(&self, user_id: &str) {
        let mut connections = self.connections.write().await;
        connections.remove(user_id);
    }

    async fn send_to_user(&self, user_id: &str, message: &str) -> bool {
        let connections = self.connections.read().await;
        match connections.get(user_id) {
            Some(sender) => sender.send(message.to_string()).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_to_offline_user_returns_false() {
        let manager = InMemoryConnectionManager::new();
        assert!(!manager.send_to_user("nobody", "hello").await);
    }

    #[tokio::test]
    async fn test_send_to_registered_user() {
        let manager = InMemoryConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.register("alice".to_string(), tx).await;

        assert!(manager.send_to_user("alice", "hello").await);
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let manager = InMemoryConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        manager.register("alice".to_string(), tx).await;
        manager.unregister("alice").await;

        assert!(!manager.send_to_user("alice", "hello").await);
    }
}
