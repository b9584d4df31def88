// Public API - what other modules can use
pub use bridge::{AiInteraction, AssistantBridge, AssistantConfig};
pub use client::{AssistantClient, AssistantError, HttpAssistantClient};

// Internal modules
mod bridge;
mod client;
