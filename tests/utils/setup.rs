use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use tutorlive::assistant::AssistantConfig;
use tutorlive::auth::JwtIdentityProvider;
use tutorlive::notification::repository::InMemoryNotificationRepository;
use tutorlive::session::repository::InMemorySessionRepository;
use tutorlive::websockets::ConnectionContext;
use tutorlive::{
    AppError, AppState, AssistantClient, LiveMessageHandler, MessageHandler, Role, SessionMode,
    SessionModel, WebSocketMessage,
};

use super::mocks::{MockAssistantClient, MockBehavior};

/// One simulated live-channel client: its registry membership plus the
/// receiving end of its outbound channel.
pub struct TestClient {
    pub user_id: String,
    pub role: Role,
    pub connection_id: Uuid,
    rx: mpsc::UnboundedReceiver<String>,
}

impl TestClient {
    /// Everything delivered so far, decoded
    pub fn drain(&mut self) -> Vec<WebSocketMessage> {
        let mut out = Vec::new();
        while let Ok(text) = self.rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    /// Next delivered message, waiting up to two seconds
    pub async fn next(&mut self) -> WebSocketMessage {
        let text = timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("channel closed");
        serde_json::from_str(&text).unwrap()
    }

    pub fn assert_silent(&mut self) {
        assert!(
            self.rx.try_recv().is_err(),
            "expected no messages for {}",
            self.user_id
        );
    }
}

/// Wires the real services with in-memory repositories, mirroring the
/// server's connection handling without real sockets.
pub struct TestSetup {
    pub state: AppState,
    pub session_repository: Arc<InMemorySessionRepository>,
    pub session: SessionModel,
    handler: Arc<LiveMessageHandler>,
}

impl TestSetup {
    pub async fn new(mode: SessionMode) -> Self {
        Self::with_assistant(
            mode,
            Arc::new(MockAssistantClient::new(MockBehavior::Answer)),
            Duration::from_secs(5),
        )
        .await
    }

    /// Like `new`, but leaves the session in its initial pending state
    pub async fn pending(mode: SessionMode) -> Self {
        Self::build(
            mode,
            Arc::new(MockAssistantClient::new(MockBehavior::Answer)),
            Duration::from_secs(5),
            false,
        )
        .await
    }

    pub async fn with_assistant(
        mode: SessionMode,
        assistant: Arc<dyn AssistantClient>,
        answer_timeout: Duration,
    ) -> Self {
        Self::build(mode, assistant, answer_timeout, true).await
    }

    async fn build(
        mode: SessionMode,
        assistant: Arc<dyn AssistantClient>,
        answer_timeout: Duration,
        activate: bool,
    ) -> Self {
        let session_repository = Arc::new(InMemorySessionRepository::new());
        let state = AppState::new(
            session_repository.clone(),
            Arc::new(InMemoryNotificationRepository::new()),
            Arc::new(JwtIdentityProvider::new("integration-test-secret")),
            assistant,
            AssistantConfig { answer_timeout },
        );

        let session = state
            .session_service
            .create("Integration test session".to_string(), "host".to_string(), mode)
            .await
            .unwrap();
        let session = if activate {
            state.session_service.activate(&session.id).await.unwrap()
        } else {
            session
        };

        let handler = Arc::new(LiveMessageHandler::new(
            state.clone(),
            session.title.clone(),
        ));

        Self {
            state,
            session_repository,
            session,
            handler,
        }
    }

    /// Joins a client the way the upgrade handler does: registry join,
    /// per-user channel registration, MEMBER_LIST to the joiner and
    /// USER_JOINED to everyone else.
    pub async fn connect(&self, user_id: &str, role: Role) -> Result<TestClient, AppError> {
        let session = self
            .state
            .session_service
            .get(&self.session.id)
            .await?
            .expect("session exists");

        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = self
            .state
            .registry
            .join(connection_id, &session, user_id, role, tx.clone())
            .await?;

        self.state
            .connection_manager
            .register(user_id.to_string(), tx.clone())
            .await;

        let member_list = WebSocketMessage::member_list(&session.id, &outcome.members);
        let _ = tx.send(serde_json::to_string(&member_list).unwrap());

        if !outcome.rejoined {
            let joined = WebSocketMessage::user_joined(&session.id, user_id, role);
            self.state
                .broadcaster
                .publish_except(&session.id, connection_id, &joined)
                .await;
        }

        Ok(TestClient {
            user_id: user_id.to_string(),
            role,
            connection_id,
            rx,
        })
    }

    /// Feeds one raw inbound frame through the typed dispatch as the client
    pub async fn send_raw(&self, client: &TestClient, message_type: &str, payload: serde_json::Value) {
        let ctx = ConnectionContext {
            connection_id: client.connection_id,
            session_id: self.session.id.clone(),
            user_id: client.user_id.clone(),
            role: client.role,
        };
        let frame = json!({
            "type": message_type,
            "sessionId": self.session.id,
            "payload": payload,
            "timestamp": chrono::Utc::now(),
        });
        self.handler
            .handle_message(&ctx, frame.to_string())
            .await;
    }

    pub async fn send_chat(&self, client: &TestClient, content: &str) {
        self.send_raw(client, "CHAT", json!({ "content": content })).await;
    }
}
