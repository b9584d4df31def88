// Public API - what other modules can use
pub use handlers::{
    list_notifications, mark_all_notifications_read, mark_notification_read, unread_count,
};
pub use models::{NotificationKind, NotificationModel};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
pub mod service;
