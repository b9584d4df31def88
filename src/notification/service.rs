use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::models::{NotificationKind, NotificationModel};
use super::repository::NotificationRepository;
use crate::shared::AppError;
use crate::websockets::{ConnectionManager, WebSocketMessage};

/// Fans an event out to one user: durable store first, live channel second.
///
/// Live delivery failing because the user is offline is the common case, not
/// an error; the record remains available via `list`.
pub struct NotificationService {
    repository: Arc<dyn NotificationRepository + Send + Sync>,
    connection_manager: Arc<dyn ConnectionManager>,
}

impl NotificationService {
    pub fn new(
        repository: Arc<dyn NotificationRepository + Send + Sync>,
        connection_manager: Arc<dyn ConnectionManager>,
    ) -> Self {
        Self {
            repository,
            connection_manager,
        }
    }

    /// Persists the notification, then attempts live delivery
    #[instrument(skip(self, title, message, related_ref))]
    pub async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: String,
        message: String,
        related_ref: Option<String>,
    ) -> Result<NotificationModel, AppError> {
        let notification =
            NotificationModel::new(user_id.to_string(), kind, title, message, related_ref);
        self.repository.create_notification(&notification).await?;

        let ws_message = WebSocketMessage::notification(&notification);
        let delivered = match serde_json::to_string(&ws_message) {
            Ok(text) => self.connection_manager.send_to_user(user_id, &text).await,
            Err(_) => false,
        };

        if delivered {
            info!(
                notification_id = %notification.id,
                user_id = %user_id,
                "Notification delivered live"
            );
        } else {
            debug!(
                notification_id = %notification.id,
                user_id = %user_id,
                "User offline, notification stored for pull"
            );
        }

        Ok(notification)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<NotificationModel>, AppError> {
        self.repository.list_for_user(user_id).await
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64, AppError> {
        self.repository.unread_count(user_id).await
    }

    pub async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<(), AppError> {
        self.repository.mark_read(user_id, notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        self.repository.mark_all_read(user_id).await
    }
}
