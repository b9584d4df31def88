use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Failure modes of the external answer service
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Assistant request timed out")]
    Timeout,

    #[error("Assistant service error: {0}")]
    Service(String),
}

/// Black-box interface to the external AI answer service
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn ask(&self, question: &str, context: &str) -> Result<String, AssistantError>;
}

/// HTTP client for the platform's answer service.
///
/// Deadlines are owned by the bridge, not here: the bridge races this call
/// against its timeout and drops the future when it fires.
pub struct HttpAssistantClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpAssistantClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl AssistantClient for HttpAssistantClient {
    async fn ask(&self, question: &str, context: &str) -> Result<String, AssistantError> {
        debug!(endpoint = %self.endpoint, "Sending assistant request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "question": question,
                "context": context,
            }))
            .send()
            .await
            .map_err(|e| AssistantError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AssistantError::Service(format!(
                "Unexpected status: {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Service(e.to_string()))?;

        body.get("answer")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| AssistantError::Service("Response missing answer field".to_string()))
    }
}
