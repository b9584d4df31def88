use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// What produced a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    AssignmentGraded,
    ResourcePublished,
    DiscussionReply,
    AssistantReply,
}

/// Persisted notification record.
///
/// Delivered at most once on the user's live channel and always durably
/// stored for later pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationModel {
    pub id: String, // UUID v4 as string
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    /// Optional pointer to the owning record (assignment, resource, thread)
    pub related_ref: Option<String>,
}

impl NotificationModel {
    pub fn new(
        user_id: String,
        kind: NotificationKind,
        title: String,
        message: String,
        related_ref: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            kind,
            title,
            message,
            read: false,
            created_at: Utc::now(),
            related_ref,
        }
    }
}
