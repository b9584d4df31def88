// Library crate for the tutoring platform's live session core
// This file exposes the public API for integration tests

pub mod assistant;
pub mod auth;
pub mod notification;
pub mod reaper;
pub mod room;
pub mod session;
pub mod shared;
pub mod signaling;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use assistant::{AssistantBridge, AssistantClient, AssistantConfig, AssistantError};
pub use auth::{AuthUser, IdentityProvider, Role};
pub use notification::{NotificationKind, NotificationModel};
pub use room::{Broadcaster, MemberInfo, RoomRegistry};
pub use session::{SessionMode, SessionModel, SessionStatus};
pub use shared::{AppError, AppState};
pub use signaling::{SignalEnvelope, SignalKind, SignalingRelay};
pub use websockets::{
    ConnectionManager, LiveMessageHandler, MessageHandler, MessageType, WebSocketMessage,
};
