// Public API - what other modules can use
pub use handlers::{activate_session, create_session, end_session, get_session};
pub use models::{SessionMode, SessionModel, SessionStatus};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
pub mod service;
