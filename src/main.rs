mod assistant;
mod auth;
mod notification;
mod reaper;
mod room;
mod session;
mod shared;
mod signaling;
mod websockets;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant::{AssistantConfig, HttpAssistantClient};
use auth::JwtIdentityProvider;
use notification::repository::InMemoryNotificationRepository;
// use notification::repository::PostgresNotificationRepository; // For production
use reaper::ReaperConfig;
use session::repository::InMemorySessionRepository;
// use session::repository::PostgresSessionRepository; // For production
use shared::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutorlive=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tutoring live session server");

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());
    let assistant_url = std::env::var("ASSISTANT_URL")
        .unwrap_or_else(|_| "http://localhost:8089/ask".to_string());
    let assistant_key = std::env::var("ASSISTANT_API_KEY").unwrap_or_default();

    // Create shared application state with dependency injection
    let session_repository = Arc::new(InMemorySessionRepository::new());
    let notification_repository = Arc::new(InMemoryNotificationRepository::new());

    // For production with PostgreSQL:
    // let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    // let pool = sqlx::PgPool::connect(&database_url).await.expect("Failed to connect to database");
    // let session_repository = Arc::new(PostgresSessionRepository::new(pool.clone()));
    // let notification_repository = Arc::new(PostgresNotificationRepository::new(pool));

    let app_state = AppState::new(
        session_repository,
        notification_repository,
        Arc::new(JwtIdentityProvider::new(&jwt_secret)),
        Arc::new(HttpAssistantClient::new(assistant_url, assistant_key)),
        AssistantConfig::default(),
    );

    // Background sweep that force-ends sessions left active too long
    tokio::spawn(reaper::start_reaper_task(
        Arc::clone(&app_state.session_service),
        Arc::clone(&app_state.registry),
        Arc::clone(&app_state.broadcaster),
        Arc::clone(&app_state.assistant),
        ReaperConfig::default(),
    ));

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/sessions", post(session::create_session))
        .route("/sessions/:id", get(session::get_session))
        .route("/sessions/:id/activate", post(session::activate_session))
        .route("/sessions/:id/end", post(session::end_session))
        .route("/ws/:session_id", get(websockets::websocket_handler))
        .route("/notifications", get(notification::list_notifications))
        .route(
            "/notifications/unread-count",
            get(notification::unread_count),
        )
        .route(
            "/notifications/:id/read",
            post(notification::mark_notification_read),
        )
        .route(
            "/notifications/read-all",
            post(notification::mark_all_notifications_read),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");
    info!("Server running on http://{}", bind_addr);
    axum::serve(listener, app).await.expect("Server error");
}
