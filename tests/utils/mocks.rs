use async_trait::async_trait;
use std::time::Duration;

use tutorlive::{AssistantClient, AssistantError};

/// How the mock assistant should behave for every question
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Reply instantly with "answer: <question>"
    Answer,
    /// Sleep far past any reasonable timeout
    Hang,
    /// Fail with a service error
    Fail,
}

pub struct MockAssistantClient {
    behavior: MockBehavior,
}

impl MockAssistantClient {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl AssistantClient for MockAssistantClient {
    async fn ask(&self, question: &str, _context: &str) -> Result<String, AssistantError> {
        match self.behavior {
            MockBehavior::Answer => Ok(format!("answer: {}", question)),
            MockBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
            MockBehavior::Fail => Err(AssistantError::Service("mock failure".to_string())),
        }
    }
}
