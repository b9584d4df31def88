use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::assistant::{AssistantBridge, AssistantClient, AssistantConfig};
use crate::auth::IdentityProvider;
use crate::notification::repository::NotificationRepository;
use crate::notification::service::NotificationService;
use crate::room::{Broadcaster, RoomRegistry};
use crate::session::models::SessionStatus;
use crate::session::repository::SessionRepository;
use crate::session::service::SessionService;
use crate::signaling::SignalingRelay;
use crate::websockets::{ConnectionManager, InMemoryConnectionManager};

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub session_repository: Arc<dyn SessionRepository + Send + Sync>,
    pub notification_repository: Arc<dyn NotificationRepository + Send + Sync>,
    pub registry: Arc<RoomRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub relay: Arc<SignalingRelay>,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub session_service: Arc<SessionService>,
    pub notification_service: Arc<NotificationService>,
    pub assistant: Arc<AssistantBridge>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Wires the full dependency graph from the leaf dependencies.
    ///
    /// Repositories and the assistant client are injected so the same wiring
    /// serves production (Postgres, HTTP assistant) and tests (in-memory,
    /// mocks).
    pub fn new(
        session_repository: Arc<dyn SessionRepository + Send + Sync>,
        notification_repository: Arc<dyn NotificationRepository + Send + Sync>,
        identity: Arc<dyn IdentityProvider>,
        assistant_client: Arc<dyn AssistantClient>,
        assistant_config: AssistantConfig,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry)));
        let relay = Arc::new(SignalingRelay::new(Arc::clone(&broadcaster)));
        let connection_manager: Arc<dyn ConnectionManager> =
            Arc::new(InMemoryConnectionManager::new());
        let session_service = Arc::new(SessionService::new(Arc::clone(&session_repository)));
        let notification_service = Arc::new(NotificationService::new(
            Arc::clone(&notification_repository),
            Arc::clone(&connection_manager),
        ));
        let assistant = Arc::new(AssistantBridge::new(
            assistant_client,
            Arc::clone(&broadcaster),
            assistant_config,
        ));

        Self {
            session_repository,
            notification_repository,
            registry,
            broadcaster,
            relay,
            connection_manager,
            session_service,
            notification_service,
            assistant,
            identity,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing input on the live channel; connection-local.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Join attempted against a session that is already ended or archived.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Third participant attempted to join a two-party media room.
    #[error("Room full: {0}")]
    RoomFull(String),

    /// Session status may only move forward along
    /// pending -> active -> ended -> archived.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Protocol(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::SessionClosed(msg) => (StatusCode::CONFLICT, msg),
            AppError::RoomFull(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                format!("Invalid session transition: {} -> {}", from, to),
            ),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::assistant::AssistantError;
    use crate::auth::{AuthUser, Role};
    use crate::notification::repository::InMemoryNotificationRepository;
    use crate::session::repository::InMemorySessionRepository;
    use async_trait::async_trait;

    /// Identity provider that accepts any token of the form "user:role"
    pub struct PermissiveIdentityProvider;

    #[async_trait]
    impl IdentityProvider for PermissiveIdentityProvider {
        async fn authenticate(&self, token: &str) -> Result<AuthUser, AppError> {
            let (id, role) = token
                .split_once(':')
                .ok_or_else(|| AppError::Unauthorized("Malformed token".to_string()))?;
            let role = match role {
                "tutor" => Role::Tutor,
                "student" => Role::Student,
                "admin" => Role::Admin,
                other => return Err(AppError::Unauthorized(format!("Unknown role: {}", other))),
            };
            Ok(AuthUser {
                id: id.to_string(),
                role,
            })
        }
    }

    /// Assistant client that answers every question with a canned string
    pub struct EchoAssistantClient;

    #[async_trait]
    impl AssistantClient for EchoAssistantClient {
        async fn ask(&self, question: &str, _context: &str) -> Result<String, AssistantError> {
            Ok(format!("echo: {}", question))
        }
    }

    /// Builder for creating AppState with overrides for testing
    pub struct AppStateBuilder {
        session_repository: Option<Arc<dyn SessionRepository + Send + Sync>>,
        notification_repository: Option<Arc<dyn NotificationRepository + Send + Sync>>,
        assistant_client: Option<Arc<dyn AssistantClient>>,
        assistant_config: AssistantConfig,
    }

    impl AppStateBuilder {
        pub fn new() -> Self {
            Self {
                session_repository: None,
                notification_repository: None,
                assistant_client: None,
                assistant_config: AssistantConfig::default(),
            }
        }

        pub fn with_session_repository(
            mut self,
            repo: Arc<dyn SessionRepository + Send + Sync>,
        ) -> Self {
            self.session_repository = Some(repo);
            self
        }

        pub fn with_notification_repository(
            mut self,
            repo: Arc<dyn NotificationRepository + Send + Sync>,
        ) -> Self {
            self.notification_repository = Some(repo);
            self
        }

        pub fn with_assistant_client(mut self, client: Arc<dyn AssistantClient>) -> Self {
            self.assistant_client = Some(client);
            self
        }

        pub fn with_assistant_config(mut self, config: AssistantConfig) -> Self {
            self.assistant_config = config;
            self
        }

        pub fn build(self) -> AppState {
            AppState::new(
                self.session_repository
                    .unwrap_or_else(|| Arc::new(InMemorySessionRepository::new())),
                self.notification_repository
                    .unwrap_or_else(|| Arc::new(InMemoryNotificationRepository::new())),
                Arc::new(PermissiveIdentityProvider),
                self.assistant_client
                    .unwrap_or_else(|| Arc::new(EchoAssistantClient)),
                self.assistant_config,
            )
        }
    }

    impl Default for AppStateBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
