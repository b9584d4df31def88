use async_trait::async_trait;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::session::models::SessionModel;
use crate::shared::{AppError, AppState};
use crate::signaling::SignalEnvelope;

use super::messages::{
    AskPayload, ChatPayload, FeedbackPayload, MessageType, SignalPayload, WebSocketMessage,
};
use super::socket::{Connection, ConnectionContext, MessageHandler, SocketWrapper};

/// Inbound dispatch for one session's live channel.
///
/// Parses the typed client message union (chat | signal | ask | feedback |
/// leave) and routes each to the owning component. Malformed input is
/// connection-local: logged, answered with an ERROR where possible, never
/// broadcast.
pub struct LiveMessageHandler {
    state: AppState,
    session_title: String,
}

impl LiveMessageHandler {
    pub fn new(state: AppState, session_title: String) -> Self {
        Self {
            state,
            session_title,
        }
    }

    async fn reply_error(&self, ctx: &ConnectionContext, error: AppError) {
        let error = WebSocketMessage::error(Some(&ctx.session_id), error.to_string());
        if let Ok(text) = serde_json::to_string(&error) {
            self.state
                .connection_manager
                .send_to_user(&ctx.user_id, &text)
                .await;
        }
    }

    async fn handle_chat(&self, ctx: &ConnectionContext, payload: ChatPayload) {
        let message =
            WebSocketMessage::chat(&ctx.session_id, ctx.user_id.clone(), payload.content);
        self.state.broadcaster.publish(&ctx.session_id, &message).await;
    }

    async fn handle_signal(&self, ctx: &ConnectionContext, payload: SignalPayload) {
        let envelope = SignalEnvelope {
            session_id: ctx.session_id.clone(),
            kind: payload.kind,
            sender_id: ctx.user_id.clone(),
            payload: payload.data,
        };
        self.state.relay.relay(ctx.connection_id, envelope).await;
    }

    async fn handle_ask(&self, ctx: &ConnectionContext, payload: AskPayload) {
        self.state
            .assistant
            .ask(
                &ctx.session_id,
                &ctx.user_id,
                payload.question,
                self.session_title.clone(),
            )
            .await;
    }

    async fn handle_feedback(&self, ctx: &ConnectionContext, payload: FeedbackPayload) {
        if let Err(e) = self
            .state
            .assistant
            .feedback(&ctx.session_id, payload.index, payload.helpful)
            .await
        {
            self.reply_error(ctx, e).await;
        }
    }

    async fn handle_leave(&self, ctx: &ConnectionContext) {
        announce_departure(&self.state, ctx.connection_id).await;
        self.state.connection_manager.unregister(&ctx.user_id).await;
    }
}

#[async_trait]
impl MessageHandler for LiveMessageHandler {
    async fn handle_message(&self, ctx: &ConnectionContext, message: String) {
        let parsed = match serde_json::from_str::<WebSocketMessage>(&message) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    user_id = %ctx.user_id,
                    session_id = %ctx.session_id,
                    error = %e,
                    "Dropping malformed live message"
                );
                self.reply_error(ctx, AppError::Protocol("Malformed message".to_string()))
                    .await;
                return;
            }
        };

        debug!(
            user_id = %ctx.user_id,
            session_id = %ctx.session_id,
            message_type = ?parsed.message_type,
            "Received live message"
        );

        match parsed.message_type {
            MessageType::Chat => match serde_json::from_value(parsed.payload) {
                Ok(payload) => self.handle_chat(ctx, payload).await,
                Err(_) => self.reply_error(ctx, AppError::Protocol("Invalid chat payload".to_string())).await,
            },
            MessageType::Signal => match serde_json::from_value(parsed.payload) {
                Ok(payload) => self.handle_signal(ctx, payload).await,
                Err(_) => {
                    self.reply_error(ctx, AppError::Protocol("Invalid signal payload".to_string()))
                        .await
                }
            },
            MessageType::Ask => match serde_json::from_value(parsed.payload) {
                Ok(payload) => self.handle_ask(ctx, payload).await,
                Err(_) => self.reply_error(ctx, AppError::Protocol("Invalid ask payload".to_string())).await,
            },
            MessageType::Feedback => match serde_json::from_value(parsed.payload) {
                Ok(payload) => self.handle_feedback(ctx, payload).await,
                Err(_) => {
                    self.reply_error(ctx, AppError::Protocol("Invalid feedback payload".to_string()))
                        .await
                }
            },
            MessageType::Leave => self.handle_leave(ctx).await,
            other => {
                debug!(message_type = ?other, "Ignoring server-only message type from client");
            }
        }
    }
}

/// WebSocket endpoint for a session's live channel.
/// GET /ws/{session_id} with the auth token in Sec-WebSocket-Protocol.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let token = headers
        .get("sec-websocket-protocol")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Sec-WebSocket-Protocol header");
            AppError::Unauthorized("Missing authentication token".to_string())
        })?;

    let user = state.identity.authenticate(token).await?;

    let session = state
        .session_service
        .get(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.status.is_closed() {
        warn!(
            session_id = %session_id,
            status = %session.status,
            "Rejecting connection to closed session"
        );
        return Err(AppError::SessionClosed(format!(
            "Session {} is {}",
            session.id, session.status
        )));
    }

    // Best-effort early rejection of a third media peer; the registry join
    // after upgrade stays authoritative.
    if session.mode.is_media() && state.registry.members(&session_id).await.len() >= 2 {
        return Err(AppError::RoomFull(format!(
            "Session {} already has 2 participants",
            session_id
        )));
    }

    info!(
        session_id = %session_id,
        user_id = %user.id,
        "WebSocket authentication successful"
    );
    Ok(ws.on_upgrade(move |socket| handle_websocket_connection(socket, session, user, state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: axum::extract::ws::WebSocket,
    session: SessionModel,
    user: AuthUser,
    state: AppState,
) {
    let connection_id = Uuid::new_v4();
    let session_id = session.id.clone();

    // Outbound channel (app -> client); clones of the sender live in the
    // room registry and the per-user connection map.
    let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel::<String>();

    let outcome = match state
        .registry
        .join(
            connection_id,
            &session,
            &user.id,
            user.role,
            outbound_sender.clone(),
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            // Lost a race against another joiner; tell the client and close.
            warn!(
                session_id = %session_id,
                user_id = %user.id,
                error = %e,
                "Join rejected after upgrade"
            );
            let error = WebSocketMessage::error(Some(&session_id), e.to_string());
            if let Ok(text) = serde_json::to_string(&error) {
                let _ = outbound_sender.send(text);
            }
            drop(outbound_sender);
            let mut socket = socket;
            let mut receiver = outbound_receiver;
            while let Some(text) = receiver.recv().await {
                let _ = socket.send_message(text).await;
            }
            let _ = socket.close().await;
            return;
        }
    };

    state
        .connection_manager
        .register(user.id.clone(), outbound_sender.clone())
        .await;

    // The joiner gets the member list; everyone else hears about the join,
    // unless this was a silent re-join replacement.
    let member_list = WebSocketMessage::member_list(&session_id, &outcome.members);
    if let Ok(text) = serde_json::to_string(&member_list) {
        let _ = outbound_sender.send(text);
    }
    if !outcome.rejoined {
        let joined = WebSocketMessage::user_joined(&session_id, &user.id, user.role);
        state
            .broadcaster
            .publish_except(&session_id, connection_id, &joined)
            .await;
    }

    info!(
        session_id = %session_id,
        user_id = %user.id,
        "WebSocket connection established"
    );

    let message_handler = Arc::new(LiveMessageHandler::new(
        state.clone(),
        session.title.clone(),
    ));
    let ctx = ConnectionContext {
        connection_id,
        session_id: session_id.clone(),
        user_id: user.id.clone(),
        role: user.role,
    };

    let connection = Connection::new(
        ctx,
        Box::new(socket),
        outbound_receiver,
        message_handler,
    );

    match connection.run().await {
        Ok(()) => {
            info!(
                session_id = %session_id,
                user_id = %user.id,
                "WebSocket connection closed cleanly"
            );
        }
        Err(e) => {
            warn!(
                session_id = %session_id,
                user_id = %user.id,
                error = ?e,
                "WebSocket connection error"
            );
        }
    }

    // Disconnect cleanup; a no-op when the client already sent LEAVE.
    announce_departure(&state, connection_id).await;
    state.connection_manager.unregister(&user.id).await;
}

/// Removes the connection's membership and tells the remaining members.
/// Safe to call twice; the second call finds nothing to remove.
pub(crate) async fn announce_departure(state: &AppState, connection_id: Uuid) {
    if let Some(departed) = state.registry.leave(connection_id).await {
        let message = WebSocketMessage::user_left(&departed.session_id, &departed.user_id);
        state
            .broadcaster
            .publish(&departed.session_id, &message)
            .await;
    }
}
