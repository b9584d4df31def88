use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::models::{SessionMode, SessionModel, SessionStatus};
use crate::auth::bearer_user;
use crate::room::MemberInfo;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    pub mode: SessionMode,
}

#[derive(Debug, Deserialize, Default)]
pub struct EndSessionRequest {
    pub recording_ref: Option<String>,
}

/// Participant entry in the polling snapshot
#[derive(Debug, Serialize)]
pub struct ParticipantView {
    pub user_id: String,
    pub role: crate::auth::Role,
}

/// Plain record clients poll after a reconnect
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub participants: Vec<ParticipantView>,
}

/// POST /sessions - creates a pending session hosted by the caller
#[instrument(skip(state, headers, request))]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionModel>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    let session = state
        .session_service
        .create(request.title, user.id, request.mode)
        .await?;
    Ok(Json(session))
}

/// GET /sessions/:id - polling snapshot of status, mode and live participants
#[instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = state
        .session_service
        .get(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let participants = state
        .registry
        .members(&session_id)
        .await
        .into_iter()
        .map(|m: MemberInfo| ParticipantView {
            user_id: m.user_id,
            role: m.role,
        })
        .collect();

    Ok(Json(SessionSnapshot {
        status: session.status,
        mode: session.mode,
        participants,
    }))
}

/// POST /sessions/:id/activate
#[instrument(skip(state, headers))]
pub async fn activate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SessionModel>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    let session = ensure_host(&state, &session_id, &user.id).await?;
    let session = state.session_service.activate(&session.id).await?;
    Ok(Json(session))
}

/// POST /sessions/:id/end - ends the session and tells any lingering members
#[instrument(skip(state, headers, request))]
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    request: Option<Json<EndSessionRequest>>,
) -> Result<Json<SessionModel>, AppError> {
    let user = bearer_user(&headers, &state.identity).await?;
    ensure_host(&state, &session_id, &user.id).await?;

    let recording_ref = request.and_then(|Json(r)| r.recording_ref);
    let session = state.session_service.end(&session_id, recording_ref).await?;
    state.assistant.forget_session(&session_id).await;

    if state.registry.has_members(&session_id).await {
        let message =
            crate::websockets::WebSocketMessage::session_status_changed(&session_id, session.status);
        state.broadcaster.publish(&session_id, &message).await;
    }

    Ok(Json(session))
}

async fn ensure_host(
    state: &AppState,
    session_id: &str,
    user_id: &str,
) -> Result<SessionModel, AppError> {
    let session = state
        .session_service
        .get(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.host_id != user_id {
        return Err(AppError::Unauthorized(
            "Only the host may change session status".to_string(),
        ));
    }
    Ok(session)
}
