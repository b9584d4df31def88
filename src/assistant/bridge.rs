use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::client::{AssistantClient, AssistantError};
use crate::room::Broadcaster;
use crate::shared::AppError;
use crate::websockets::WebSocketMessage;

/// Configuration for the AI co-attendee bridge
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Deadline for the external answer call; past it the room gets the
    /// fallback message instead.
    pub answer_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(30),
        }
    }
}

/// One question/answer exchange with the assistant
#[derive(Debug, Clone)]
pub struct AiInteraction {
    pub index: u64,
    pub asker_id: String,
    pub question: String,
    pub answer: Option<String>,
    pub helpful: Option<bool>,
}

#[derive(Default)]
struct SessionInteractions {
    next_index: u64,
    records: HashMap<u64, AiInteraction>,
}

/// Injects the external assistant's replies into the room stream as if it
/// were another attendee.
///
/// `ask` returns the interaction index immediately and resolves the answer
/// on a spawned task, so the asking connection keeps handling other inbound
/// messages while the external call is in flight. Indices are dense and
/// unique per session even under concurrent asks.
pub struct AssistantBridge {
    client: Arc<dyn AssistantClient>,
    broadcaster: Arc<Broadcaster>,
    config: AssistantConfig,
    sessions: Arc<Mutex<HashMap<String, SessionInteractions>>>,
}

impl AssistantBridge {
    pub fn new(
        client: Arc<dyn AssistantClient>,
        broadcaster: Arc<Broadcaster>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            client,
            broadcaster,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Assigns the next interaction index for the session and spawns the
    /// answer resolution. The room stream never blocks on the external call.
    #[instrument(skip(self, question))]
    pub async fn ask(
        &self,
        session_id: &str,
        asker_id: &str,
        question: String,
        context: String,
    ) -> u64 {
        let index = {
            let mut sessions = self.sessions.lock().await;
            let interactions = sessions.entry(session_id.to_string()).or_default();
            let index = interactions.next_index;
            interactions.next_index += 1;
            interactions.records.insert(
                index,
                AiInteraction {
                    index,
                    asker_id: asker_id.to_string(),
                    question: question.clone(),
                    answer: None,
                    helpful: None,
                },
            );
            index
        };

        info!(
            session_id = %session_id,
            index = index,
            "Assistant question accepted"
        );

        let client = Arc::clone(&self.client);
        let broadcaster = Arc::clone(&self.broadcaster);
        let sessions = Arc::clone(&self.sessions);
        let answer_timeout = self.config.answer_timeout;
        let session_id = session_id.to_string();
        tokio::spawn(resolve_answer(
            client,
            broadcaster,
            sessions,
            answer_timeout,
            session_id,
            index,
            question,
            context,
        ));

        index
    }

    /// Records helpfulness feedback against the stored interaction, even
    /// after later interactions have been created.
    #[instrument(skip(self))]
    pub async fn feedback(
        &self,
        session_id: &str,
        index: u64,
        helpful: bool,
    ) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().await;
        let record = sessions
            .get_mut(session_id)
            .and_then(|s| s.records.get_mut(&index))
            .ok_or_else(|| AppError::NotFound(format!("No interaction {} in session", index)))?;

        record.helpful = Some(helpful);
        debug!(session_id = %session_id, index = index, helpful = helpful, "Feedback recorded");
        Ok(())
    }

    /// Drops every stored interaction for a session. Called once the
    /// session has ended so the per-session map does not grow forever.
    #[instrument(skip(self))]
    pub async fn forget_session(&self, session_id: &str) {
        if self.sessions.lock().await.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Dropped assistant interactions");
        }
    }

    /// Stored record for an interaction, if any
    pub async fn interaction(&self, session_id: &str, index: u64) -> Option<AiInteraction> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .and_then(|s| s.records.get(&index))
            .cloned()
    }

}

#[allow(clippy::too_many_arguments)]
async fn resolve_answer(
    client: Arc<dyn AssistantClient>,
    broadcaster: Arc<Broadcaster>,
    sessions: Arc<Mutex<HashMap<String, SessionInteractions>>>,
    answer_timeout: Duration,
    session_id: String,
    index: u64,
    question: String,
    context: String,
) {
    // Racing against the deadline; dropping the losing future cancels
    // the in-flight request and releases upstream resources.
    let outcome = timeout(answer_timeout, client.ask(&question, &context)).await;

    let message = match outcome {
        Ok(Ok(answer)) => {
            let mut sessions = sessions.lock().await;
            if let Some(record) = sessions
                .get_mut(&session_id)
                .and_then(|s| s.records.get_mut(&index))
            {
                record.answer = Some(answer.clone());
            }
            info!(session_id = %session_id, index = index, "Assistant answered");
            WebSocketMessage::assistant_answer(&session_id, index, &answer)
        }
        Ok(Err(e)) => {
            warn!(session_id = %session_id, index = index, error = %e, "Assistant call failed");
            WebSocketMessage::assistant_unavailable(&session_id, index)
        }
        Err(_) => {
            warn!(
                session_id = %session_id,
                index = index,
                timeout_secs = answer_timeout.as_secs(),
                "Assistant call timed out"
            );
            WebSocketMessage::assistant_unavailable(&session_id, index)
        }
    };

    broadcaster.publish(&session_id, &message).await;
}
