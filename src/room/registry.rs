use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::auth::Role;
use crate::session::models::SessionModel;
use crate::shared::AppError;

/// Two peers per media room; signaling between more than two parties is
/// ambiguous and not supported.
const MEDIA_ROOM_CAPACITY: usize = 2;

/// Snapshot of one room member, safe to hand to callers
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub connection_id: Uuid,
    pub user_id: String,
    pub role: Role,
}

pub(crate) struct Member {
    pub user_id: String,
    pub role: Role,
    pub sender: mpsc::UnboundedSender<String>,
}

/// Live state of one room. Members are kept in join order behind the room's
/// own lock, so unrelated rooms never contend.
pub(crate) struct Room {
    pub members: Mutex<Vec<(Uuid, Member)>>,
}

/// Result of registering a connection into a room
pub struct JoinOutcome {
    /// Current member list, including the joiner
    pub members: Vec<MemberInfo>,
    /// True when the same connection re-joined and membership was replaced
    /// in place; no join event should be announced in that case.
    pub rejoined: bool,
}

/// Membership removed by a leave or disconnect
#[derive(Debug, Clone)]
pub struct DepartedMember {
    pub session_id: String,
    pub user_id: String,
}

/// In-memory registry mapping session ids to their connected members.
///
/// Exclusively owns room membership. Nothing here is persisted; a process
/// restart loses all memberships and clients rejoin.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    // connection -> session reverse index, so leave() needs no session id
    connections: RwLock<HashMap<Uuid, String>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn room(&self, session_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(session_id).cloned()
    }

    async fn room_or_create(&self, session_id: &str) -> Arc<Room> {
        if let Some(room) = self.room(session_id).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id = %session_id, "Creating room");
            Arc::new(Room {
                members: Mutex::new(Vec::new()),
            })
        }))
    }

    /// Registers a connection into the session's room and returns the
    /// resulting member list.
    ///
    /// A re-join by the same connection for the same user replaces the
    /// existing membership instead of duplicating it. Closed sessions are
    /// rejected with `SessionClosed`; a third participant in a media room is
    /// rejected with `RoomFull`.
    #[instrument(skip(self, session, sender), fields(session_id = %session.id))]
    pub async fn join(
        &self,
        connection_id: Uuid,
        session: &SessionModel,
        user_id: &str,
        role: Role,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<JoinOutcome, AppError> {
        if session.status.is_closed() {
            return Err(AppError::SessionClosed(format!(
                "Session {} is {}",
                session.id, session.status
            )));
        }

        let (snapshot, rejoined) = loop {
            self.room_or_create(&session.id).await;

            // Lock order matches leave's cleanup (rooms before members), and
            // holding the read guard across the push keeps a concurrent
            // last-member leave from unlinking the room underneath us.
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(&session.id).cloned() else {
                continue;
            };
            let mut members = room.members.lock().await;

            let member = Member {
                user_id: user_id.to_string(),
                role,
                sender,
            };

            let rejoined = match members.iter().position(|(id, _)| *id == connection_id) {
                Some(idx) => {
                    // Same connection, fresh sender; swap in place without a
                    // join announcement when the user is unchanged.
                    let same_user = members[idx].1.user_id == user_id;
                    members[idx].1 = member;
                    same_user
                }
                None => {
                    if session.mode.is_media() && members.len() >= MEDIA_ROOM_CAPACITY {
                        debug!(
                            user_id = %user_id,
                            member_count = members.len(),
                            "Rejecting join, media room at capacity"
                        );
                        return Err(AppError::RoomFull(format!(
                            "Session {} already has {} participants",
                            session.id, MEDIA_ROOM_CAPACITY
                        )));
                    }
                    members.push((connection_id, member));
                    false
                }
            };

            break (Self::snapshot(&members), rejoined);
        };

        self.connections
            .write()
            .await
            .insert(connection_id, session.id.clone());

        info!(
            user_id = %user_id,
            member_count = snapshot.len(),
            rejoined = rejoined,
            "Connection joined room"
        );
        Ok(JoinOutcome {
            members: snapshot,
            rejoined,
        })
    }

    /// Removes a connection's membership. Idempotent; returns what was
    /// removed so the caller can announce the departure.
    #[instrument(skip(self))]
    pub async fn leave(&self, connection_id: Uuid) -> Option<DepartedMember> {
        let session_id = self.connections.write().await.remove(&connection_id)?;
        let room = self.room(&session_id).await?;

        let mut members = room.members.lock().await;
        let idx = members.iter().position(|(id, _)| *id == connection_id)?;
        let (_, removed) = members.remove(idx);
        let now_empty = members.is_empty();
        drop(members);

        if now_empty {
            // Re-check under both locks; a join may have slipped in between.
            let mut rooms = self.rooms.write().await;
            if room.members.lock().await.is_empty() {
                debug!(session_id = %session_id, "Room empty, removing");
                rooms.remove(&session_id);
            }
        }

        info!(
            session_id = %session_id,
            user_id = %removed.user_id,
            "Connection left room"
        );
        Some(DepartedMember {
            session_id,
            user_id: removed.user_id,
        })
    }

    /// Current members of a session's room, in join order
    pub async fn members(&self, session_id: &str) -> Vec<MemberInfo> {
        match self.room(session_id).await {
            Some(room) => Self::snapshot(&room.members.lock().await),
            None => Vec::new(),
        }
    }

    /// Whether any connection is still registered for this session
    pub async fn has_members(&self, session_id: &str) -> bool {
        match self.room(session_id).await {
            Some(room) => !room.members.lock().await.is_empty(),
            None => false,
        }
    }

    fn snapshot(members: &[(Uuid, Member)]) -> Vec<MemberInfo> {
        members
            .iter()
            .map(|(id, m)| MemberInfo {
                connection_id: *id,
                user_id: m.user_id.clone(),
                role: m.role,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::{SessionMode, SessionStatus};

    fn session(mode: SessionMode, status: SessionStatus) -> SessionModel {
        let mut s = SessionModel::new("test".to_string(), "host".to_string(), mode);
        s.status = status;
        s
    }

    fn channel() -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_join_returns_member_list() {
        let registry = RoomRegistry::new();
        let s = session(SessionMode::Chat, SessionStatus::Active);

        let (tx_a, _rx_a) = channel();
        let conn_a = Uuid::new_v4();
        let outcome = registry
            .join(conn_a, &s, "alice", Role::Tutor, tx_a)
            .await
            .unwrap();
        assert_eq!(outcome.members.len(), 1);
        assert!(!outcome.rejoined);

        let (tx_b, _rx_b) = channel();
        let outcome = registry
            .join(Uuid::new_v4(), &s, "bob", Role::Student, tx_b)
            .await
            .unwrap();
        assert_eq!(outcome.members.len(), 2);
        assert_eq!(outcome.members[0].user_id, "alice");
        assert_eq!(outcome.members[1].user_id, "bob");
    }

    #[tokio::test]
    async fn test_join_closed_session_rejected() {
        let registry = RoomRegistry::new();

        for status in [SessionStatus::Ended, SessionStatus::Archived] {
            let s = session(SessionMode::Chat, status);
            let (tx, _rx) = channel();
            let result = registry.join(Uuid::new_v4(), &s, "alice", Role::Student, tx).await;
            assert!(matches!(result, Err(AppError::SessionClosed(_))));
        }

        // A rejected join leaves no trace
        assert!(!registry.has_members("missing").await);
    }

    #[tokio::test]
    async fn test_media_room_caps_at_two() {
        let registry = RoomRegistry::new();
        let s = session(SessionMode::Video, SessionStatus::Active);

        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let (tx_c, _rx_c) = channel();
        registry
            .join(Uuid::new_v4(), &s, "alice", Role::Tutor, tx_a)
            .await
            .unwrap();
        registry
            .join(Uuid::new_v4(), &s, "bob", Role::Student, tx_b)
            .await
            .unwrap();

        let result = registry
            .join(Uuid::new_v4(), &s, "carol", Role::Student, tx_c)
            .await;
        assert!(matches!(result, Err(AppError::RoomFull(_))));
        assert_eq!(registry.members(&s.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_room_has_no_two_party_cap() {
        let registry = RoomRegistry::new();
        let s = session(SessionMode::Chat, SessionStatus::Active);

        for name in ["a", "b", "c", "d"] {
            let (tx, _rx) = channel();
            registry
                .join(Uuid::new_v4(), &s, name, Role::Student, tx)
                .await
                .unwrap();
        }
        assert_eq!(registry.members(&s.id).await.len(), 4);
    }

    #[tokio::test]
    async fn test_rejoin_replaces_membership() {
        let registry = RoomRegistry::new();
        let s = session(SessionMode::Video, SessionStatus::Active);
        let conn = Uuid::new_v4();

        let (tx1, _rx1) = channel();
        let first = registry
            .join(conn, &s, "alice", Role::Tutor, tx1)
            .await
            .unwrap();
        assert!(!first.rejoined);

        let (tx2, _rx2) = channel();
        let second = registry
            .join(conn, &s, "alice", Role::Tutor, tx2)
            .await
            .unwrap();
        assert!(second.rejoined);
        assert_eq!(second.members.len(), 1);
    }

    #[tokio::test]
    async fn test_leave_removes_membership_and_is_idempotent() {
        let registry = RoomRegistry::new();
        let s = session(SessionMode::Chat, SessionStatus::Active);
        let conn = Uuid::new_v4();

        let (tx, _rx) = channel();
        registry
            .join(conn, &s, "alice", Role::Student, tx)
            .await
            .unwrap();

        let departed = registry.leave(conn).await.unwrap();
        assert_eq!(departed.session_id, s.id);
        assert_eq!(departed.user_id, "alice");
        assert!(!registry.has_members(&s.id).await);

        assert!(registry.leave(conn).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_join_racing_last_leave_stays_visible() {
        let registry = Arc::new(RoomRegistry::new());
        let s = session(SessionMode::Chat, SessionStatus::Active);

        // A leave emptying the room must never unlink it underneath a
        // concurrent join; the joiner has to stay visible afterwards.
        for _ in 0..2000 {
            let (tx_a, _rx_a) = channel();
            let conn_a = Uuid::new_v4();
            registry
                .join(conn_a, &s, "alice", Role::Student, tx_a)
                .await
                .unwrap();

            let (tx_b, _rx_b) = channel();
            let conn_b = Uuid::new_v4();

            let leave = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.leave(conn_a).await })
            };
            let join = {
                let registry = Arc::clone(&registry);
                let s = s.clone();
                tokio::spawn(async move {
                    registry.join(conn_b, &s, "bob", Role::Student, tx_b).await
                })
            };

            leave.await.unwrap();
            join.await.unwrap().unwrap();

            let members = registry.members(&s.id).await;
            assert!(
                members.iter().any(|m| m.connection_id == conn_b),
                "joiner lost to a concurrent last-member leave"
            );

            registry.leave(conn_b).await;
        }
    }
}
