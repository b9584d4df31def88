// Public API
pub use connection_manager::{ConnectionManager, InMemoryConnectionManager};
pub use handler::{websocket_handler, LiveMessageHandler};
pub use messages::{
    AskPayload, ChatPayload, FeedbackPayload, MemberListPayload, MessageType, SignalPayload,
    WebSocketMessage,
};
pub use socket::{Connection, ConnectionContext, MessageHandler, SocketWrapper};

// Internal modules
mod connection_manager;
mod handler;
mod messages;
mod socket;
