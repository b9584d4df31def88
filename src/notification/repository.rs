use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{NotificationKind, NotificationModel};
use crate::shared::AppError;

/// Trait for notification store operations
#[async_trait]
pub trait NotificationRepository {
    async fn create_notification(&self, notification: &NotificationModel) -> Result<(), AppError>;

    /// All notifications for a user, oldest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationModel>, AppError>;

    async fn unread_count(&self, user_id: &str) -> Result<u64, AppError>;

    /// Marks one of the user's notifications read; NotFound when the id does
    /// not belong to that user.
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<(), AppError>;

    /// Marks everything read, returning how many records changed
    async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError>;
}

/// In-memory implementation of NotificationRepository for development and
/// testing. A Vec keeps creation order, which is also delivery order.
pub struct InMemoryNotificationRepository {
    notifications: Mutex<Vec<NotificationModel>>,
}

impl Default for InMemoryNotificationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    #[instrument(skip(self, notification))]
    async fn create_notification(&self, notification: &NotificationModel) -> Result<(), AppError> {
        debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = %notification.kind,
            "Storing notification in memory"
        );

        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationModel>, AppError> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn unread_count(&self, user_id: &str) -> Result<u64, AppError> {
        let notifications = self.notifications.lock().unwrap();
        Ok(notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as u64)
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<(), AppError> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(n) => {
                n.read = true;
                Ok(())
            }
            None => {
                warn!(notification_id = %notification_id, "Notification not found for mark_read");
                Err(AppError::NotFound("Notification not found".to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        let mut notifications = self.notifications.lock().unwrap();
        let mut changed = 0;
        for n in notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }

        debug!(user_id = %user_id, changed = changed, "Marked all notifications read");
        Ok(changed)
    }
}

/// PostgreSQL implementation of the notification store
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: &sqlx::postgres::PgRow) -> Result<NotificationModel, AppError> {
        let kind_text: String = row
            .try_get("kind")
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(NotificationModel {
            id: row
                .try_get("id")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            user_id: row
                .try_get("user_id")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            kind: NotificationKind::from_str(&kind_text)
                .map_err(|_| AppError::DatabaseError(format!("Unknown kind: {}", kind_text)))?,
            title: row
                .try_get("title")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            message: row
                .try_get("message")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            read: row
                .try_get("read")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            related_ref: row
                .try_get("related_ref")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
        })
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    #[instrument(skip(self, notification))]
    async fn create_notification(&self, notification: &NotificationModel) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, message, read, created_at, related_ref) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&notification.id)
        .bind(&notification.user_id)
        .bind(notification.kind.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.read)
        .bind(notification.created_at)
        .bind(&notification.related_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<NotificationModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, title, message, read, created_at, related_ref \
             FROM notifications WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_notification).collect()
    }

    #[instrument(skip(self))]
    async fn unread_count(&self, user_id: &str) -> Result<u64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(count as u64)
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, user_id: &str, notification_id: &str) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(notification_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Notification not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
