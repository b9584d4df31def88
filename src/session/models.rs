use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Delivery mode of a tutoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionMode {
    Video,
    Audio,
    Chat,
}

impl SessionMode {
    /// Media sessions exchange peer-to-peer signaling and admit two peers
    pub fn is_media(&self) -> bool {
        !matches!(self, SessionMode::Chat)
    }
}

/// Lifecycle status of a session.
///
/// Status only ever moves forward along
/// pending -> active -> ended -> archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Ended,
    Archived,
}

impl SessionStatus {
    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Active => 1,
            SessionStatus::Ended => 2,
            SessionStatus::Archived => 3,
        }
    }

    /// Only the immediate next stage is reachable; skipping or moving
    /// backward is never valid.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        next.rank() == self.rank() + 1
    }

    /// Ended and archived sessions no longer accept joins
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Archived)
    }
}

/// Persisted record for a tutoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionModel {
    pub id: String, // UUID v4 as string
    pub title: String,
    pub host_id: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub recording_ref: Option<String>,
}

impl SessionModel {
    /// Creates a new pending session hosted by the given user
    pub fn new(title: String, host_id: String, mode: SessionMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            host_id,
            mode,
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            ended_at: None,
            recording_ref: None,
        }
    }
}
