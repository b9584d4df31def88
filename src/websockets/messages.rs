use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::Role;
use crate::notification::models::NotificationModel;
use crate::room::MemberInfo;
use crate::session::models::SessionStatus;
use crate::signaling::{SignalEnvelope, SignalKind};

/// Message types for the live channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client -> Server
    Chat,
    Signal,
    Ask,
    Feedback,
    Leave,

    // Server -> Client
    MemberList,
    UserJoined,
    UserLeft,
    AssistantAnswer,
    AssistantUnavailable,
    SessionStatusChanged,
    Notification,
    Error,
}

/// Wire format for every live message.
///
/// System messages set `system: true` and carry no sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub system: bool,
}

/// Client-to-Server message payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    pub kind: SignalKind,
    /// Opaque offer/answer/ICE blob; never interpreted by the server
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskPayload {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub index: u64,
    pub helpful: bool,
}

/// Server-to-Client message payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSummary {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberListPayload {
    pub members: Vec<MemberSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Helper constructors for outbound messages
impl WebSocketMessage {
    fn from_user(
        message_type: MessageType,
        session_id: Option<String>,
        sender: String,
        payload: Value,
    ) -> Self {
        Self {
            message_type,
            session_id,
            payload,
            timestamp: Utc::now(),
            sender: Some(sender),
            system: false,
        }
    }

    fn from_system(message_type: MessageType, session_id: Option<String>, payload: Value) -> Self {
        Self {
            message_type,
            session_id,
            payload,
            timestamp: Utc::now(),
            sender: None,
            system: true,
        }
    }

    /// Create a CHAT broadcast
    pub fn chat(session_id: &str, sender: String, content: String) -> Self {
        Self::from_user(
            MessageType::Chat,
            Some(session_id.to_string()),
            sender,
            json!(ChatPayload { content }),
        )
    }

    /// Create a MEMBER_LIST message for a newly joined connection
    pub fn member_list(session_id: &str, members: &[MemberInfo]) -> Self {
        let payload = MemberListPayload {
            members: members
                .iter()
                .map(|m| MemberSummary {
                    user_id: m.user_id.clone(),
                    role: m.role,
                })
                .collect(),
        };
        Self::from_system(
            MessageType::MemberList,
            Some(session_id.to_string()),
            json!(payload),
        )
    }

    /// Create a USER_JOINED presence event
    pub fn user_joined(session_id: &str, user_id: &str, role: Role) -> Self {
        Self::from_system(
            MessageType::UserJoined,
            Some(session_id.to_string()),
            json!({ "user_id": user_id, "role": role }),
        )
    }

    /// Create a USER_LEFT presence event
    pub fn user_left(session_id: &str, user_id: &str) -> Self {
        Self::from_system(
            MessageType::UserLeft,
            Some(session_id.to_string()),
            json!({ "user_id": user_id }),
        )
    }

    /// Create a SIGNAL forward; the envelope payload goes through verbatim
    pub fn signal(envelope: &SignalEnvelope) -> Self {
        Self::from_user(
            MessageType::Signal,
            Some(envelope.session_id.clone()),
            envelope.sender_id.clone(),
            json!(SignalPayload {
                kind: envelope.kind,
                data: envelope.payload.clone(),
            }),
        )
    }

    /// Create an ASSISTANT_ANSWER tagged with its interaction index
    pub fn assistant_answer(session_id: &str, index: u64, answer: &str) -> Self {
        Self::from_system(
            MessageType::AssistantAnswer,
            Some(session_id.to_string()),
            json!({ "index": index, "answer": answer }),
        )
    }

    /// Create the fallback shown when the assistant times out or fails
    pub fn assistant_unavailable(session_id: &str, index: u64) -> Self {
        Self::from_system(
            MessageType::AssistantUnavailable,
            Some(session_id.to_string()),
            json!({
                "index": index,
                "message": "The assistant is unavailable right now, please try again.",
            }),
        )
    }

    /// Create a SESSION_STATUS_CHANGED event
    pub fn session_status_changed(session_id: &str, status: SessionStatus) -> Self {
        Self::from_system(
            MessageType::SessionStatusChanged,
            Some(session_id.to_string()),
            json!({ "status": status }),
        )
    }

    /// Create a NOTIFICATION delivery for a user's channel
    pub fn notification(model: &NotificationModel) -> Self {
        Self::from_system(MessageType::Notification, None, json!(model))
    }

    /// Create a connection-local ERROR message
    pub fn error(session_id: Option<&str>, message: String) -> Self {
        Self::from_system(
            MessageType::Error,
            session_id.map(|s| s.to_string()),
            json!(ErrorPayload { message }),
        )
    }
}
