use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::registry::RoomRegistry;
use crate::websockets::WebSocketMessage;

/// Delivers messages to the current members of a room.
///
/// A room's member lock is held across the whole fanout, which makes each
/// room a single sequence point: concurrent publishes are serialized, and
/// every member observes them in the same relative order. Nothing is
/// persisted here; durable history belongs to the owning feature.
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Sends the message to every member of the room. Returns how many
    /// members it was handed to.
    pub async fn publish(&self, session_id: &str, message: &WebSocketMessage) -> usize {
        self.deliver(session_id, None, message).await
    }

    /// Sends the message to every member except one connection; used for
    /// presence events that should not echo back to their subject.
    pub async fn publish_except(
        &self,
        session_id: &str,
        excluded: Uuid,
        message: &WebSocketMessage,
    ) -> usize {
        self.deliver(session_id, Some(excluded), message).await
    }

    /// Sends the message to the single *other* member of a two-party room.
    ///
    /// Returns false without sending when the room has no unambiguous
    /// counterpart (zero members besides the sender, or more than one).
    pub async fn send_to_other(
        &self,
        session_id: &str,
        from: Uuid,
        message: &WebSocketMessage,
    ) -> bool {
        let Some(room) = self.registry.room(session_id).await else {
            return false;
        };
        let Some(text) = Self::encode(message) else {
            return false;
        };

        let members = room.members.lock().await;
        let mut others = members.iter().filter(|(id, _)| *id != from);
        match (others.next(), others.next()) {
            (Some((_, member)), None) => {
                let _ = member.sender.send(text);
                true
            }
            _ => {
                debug!(session_id = %session_id, "No single counterpart, dropping");
                false
            }
        }
    }

    async fn deliver(
        &self,
        session_id: &str,
        excluded: Option<Uuid>,
        message: &WebSocketMessage,
    ) -> usize {
        let Some(room) = self.registry.room(session_id).await else {
            debug!(session_id = %session_id, "No room for publish");
            return 0;
        };
        let Some(text) = Self::encode(message) else {
            return 0;
        };

        let members = room.members.lock().await;
        let mut delivered = 0;
        for (connection_id, member) in members.iter() {
            if excluded == Some(*connection_id) {
                continue;
            }
            // A dead sender means the connection is mid-disconnect; its
            // membership is removed by the connection's cleanup.
            if member.sender.send(text.clone()).is_ok() {
                delivered += 1;
            }
        }

        debug!(
            session_id = %session_id,
            delivered = delivered,
            message_type = ?message.message_type,
            "Message published to room"
        );
        delivered
    }

    fn encode(message: &WebSocketMessage) -> Option<String> {
        match serde_json::to_string(message) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::session::models::{SessionMode, SessionModel, SessionStatus};
    use tokio::sync::mpsc;

    async fn room_with_members(
        mode: SessionMode,
        users: &[&str],
    ) -> (
        Arc<RoomRegistry>,
        Broadcaster,
        String,
        Vec<(Uuid, mpsc::UnboundedReceiver<String>)>,
    ) {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        let mut session = SessionModel::new("test".to_string(), "host".to_string(), mode);
        session.status = SessionStatus::Active;

        let mut clients = Vec::new();
        for user in users {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = Uuid::new_v4();
            registry
                .join(conn, &session, user, Role::Student, tx)
                .await
                .unwrap();
            clients.push((conn, rx));
        }

        (registry, broadcaster, session.id, clients)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<WebSocketMessage> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_publish_reaches_all_members() {
        let (_registry, broadcaster, session_id, mut clients) =
            room_with_members(SessionMode::Chat, &["alice", "bob", "carol"]).await;

        let msg = WebSocketMessage::chat(&session_id, "alice".to_string(), "hello".to_string());
        let delivered = broadcaster.publish(&session_id, &msg).await;
        assert_eq!(delivered, 3);

        for (_, rx) in clients.iter_mut() {
            let received = drain(rx);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].payload["content"], "hello");
        }
    }

    #[tokio::test]
    async fn test_publish_skips_departed_members() {
        let (registry, broadcaster, session_id, mut clients) =
            room_with_members(SessionMode::Chat, &["alice", "bob"]).await;

        let (conn_b, _) = clients[1];
        registry.leave(conn_b).await.unwrap();

        let msg = WebSocketMessage::chat(&session_id, "alice".to_string(), "bye".to_string());
        let delivered = broadcaster.publish(&session_id, &msg).await;
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut clients.remove(1).1).len(), 0);
    }

    #[tokio::test]
    async fn test_publish_except_excludes_connection() {
        let (_registry, broadcaster, session_id, mut clients) =
            room_with_members(SessionMode::Chat, &["alice", "bob"]).await;

        let (conn_a, _) = clients[0];
        let msg = WebSocketMessage::user_joined(&session_id, "alice", Role::Student);
        let delivered = broadcaster.publish_except(&session_id, conn_a, &msg).await;
        assert_eq!(delivered, 1);

        assert!(drain(&mut clients[0].1).is_empty());
        assert_eq!(drain(&mut clients[1].1).len(), 1);
    }

    #[tokio::test]
    async fn test_members_observe_same_relative_order() {
        let (_registry, broadcaster, session_id, mut clients) =
            room_with_members(SessionMode::Chat, &["alice", "bob"]).await;
        let broadcaster = Arc::new(broadcaster);

        let mut handles = Vec::new();
        for i in 0..20 {
            let broadcaster = Arc::clone(&broadcaster);
            let session_id = session_id.clone();
            handles.push(tokio::spawn(async move {
                let msg = WebSocketMessage::chat(
                    &session_id,
                    "sender".to_string(),
                    format!("m{}", i),
                );
                broadcaster.publish(&session_id, &msg).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let order_a: Vec<String> = drain(&mut clients[0].1)
            .iter()
            .map(|m| m.payload["content"].as_str().unwrap().to_string())
            .collect();
        let order_b: Vec<String> = drain(&mut clients[1].1)
            .iter()
            .map(|m| m.payload["content"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(order_a.len(), 20);
        assert_eq!(order_a, order_b);
    }

    #[tokio::test]
    async fn test_publish_to_unknown_room_is_noop() {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Broadcaster::new(registry);

        let msg = WebSocketMessage::chat("nope", "a".to_string(), "x".to_string());
        assert_eq!(broadcaster.publish("nope", &msg).await, 0);
    }
}
