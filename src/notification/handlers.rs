use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::instrument;

use super::models::NotificationModel;
use crate::auth::bearer_user;
use crate::shared::{AppError, AppState};

/// GET /notifications - all notifications for the calling user, oldest first
#[instrument(skip(state, headers))]
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<NotificationModel>>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    let notifications = state.notification_service.list(&user.id).await?;
    Ok(Json(notifications))
}

/// GET /notifications/unread-count - badge count for the calling user
#[instrument(skip(state, headers))]
pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    let count = state.notification_service.unread_count(&user.id).await?;
    Ok(Json(json!({ "unread": count })))
}

/// POST /notifications/:id/read
#[instrument(skip(state, headers))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    state
        .notification_service
        .mark_read(&user.id, &notification_id)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

/// POST /notifications/read-all
#[instrument(skip(state, headers))]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    let changed = state.notification_service.mark_all_read(&user.id).await?;
    Ok(Json(json!({ "updated": changed })))
}
