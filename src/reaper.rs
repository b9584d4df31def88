use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::assistant::AssistantBridge;
use crate::room::{Broadcaster, RoomRegistry};
use crate::session::service::SessionService;
use crate::shared::AppError;
use crate::websockets::WebSocketMessage;

/// Configuration for the stale session reaper
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often to run the sweep
    pub sweep_interval: Duration,
    /// How long a session may stay active before being force-ended.
    /// The 4 hour default mirrors the platform's historical bound.
    pub active_bound: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5 * 60),
            active_bound: Duration::from_secs(4 * 60 * 60),
        }
    }
}

/// Starts the background task that periodically force-ends sessions left
/// active past the bound. Runs on its own cadence, independent of any
/// connection's lifecycle.
#[instrument(skip(session_service, registry, broadcaster, assistant))]
pub async fn start_reaper_task(
    session_service: Arc<SessionService>,
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<Broadcaster>,
    assistant: Arc<AssistantBridge>,
    config: ReaperConfig,
) {
    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        active_bound_secs = config.active_bound.as_secs(),
        "Starting stale session reaper"
    );

    let mut sweep_interval = interval(config.sweep_interval);

    loop {
        sweep_interval.tick().await;

        match sweep_stale_sessions(
            &session_service,
            &registry,
            &broadcaster,
            &assistant,
            config.active_bound,
        )
        .await
        {
            Ok(ended_count) => {
                if ended_count > 0 {
                    info!(ended_count = ended_count, "Reaper sweep completed");
                }
            }
            Err(e) => {
                error!(error = %e, "Reaper sweep failed");
            }
        }
    }
}

/// Force-ends sessions whose status has stayed active past the bound.
///
/// Monotonic and idempotent: a session already moved on is skipped, and a
/// persistence failure on one record never aborts the rest of the sweep.
/// Members still connected to a reaped session are told via a
/// SESSION_STATUS_CHANGED broadcast.
#[instrument(skip(session_service, registry, broadcaster, assistant))]
pub async fn sweep_stale_sessions(
    session_service: &Arc<SessionService>,
    registry: &Arc<RoomRegistry>,
    broadcaster: &Arc<Broadcaster>,
    assistant: &Arc<AssistantBridge>,
    active_bound: Duration,
) -> Result<usize, AppError> {
    let stale = session_service.stale_sessions(active_bound).await?;

    if stale.is_empty() {
        debug!("No stale sessions to reap");
        return Ok(0);
    }

    info!(count = stale.len(), "Found stale sessions to end");

    let mut ended_count = 0;

    for session in stale {
        match session_service.end(&session.id, None).await {
            Ok(ended) => {
                ended_count += 1;
                info!(session_id = %session.id, "Reaped stale session");

                assistant.forget_session(&session.id).await;

                if registry.has_members(&session.id).await {
                    let message =
                        WebSocketMessage::session_status_changed(&session.id, ended.status);
                    broadcaster.publish(&session.id, &message).await;
                }
            }
            // Lost the race against a live transition; already ended is fine.
            Err(AppError::InvalidTransition { .. }) => {
                debug!(session_id = %session.id, "Session already transitioned, skipping");
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    error = %e,
                    "Failed to reap session"
                );
            }
        }
    }

    Ok(ended_count)
}
