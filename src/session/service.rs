use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::models::{SessionMode, SessionModel, SessionStatus};
use super::repository::SessionRepository;
use crate::shared::AppError;

/// Service enforcing the session lifecycle invariants.
///
/// Every status transition for a given session id runs under that session's
/// own async mutex, so a live activation and a reaper sweep targeting the
/// same session are serialized rather than racing.
pub struct SessionService {
    repository: Arc<dyn SessionRepository + Send + Sync>,
    transition_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionService {
    pub fn new(repository: Arc<dyn SessionRepository + Send + Sync>) -> Self {
        Self {
            repository,
            transition_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.transition_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Creates a new pending session
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        title: String,
        host_id: String,
        mode: SessionMode,
    ) -> Result<SessionModel, AppError> {
        let session = SessionModel::new(title, host_id, mode);
        self.repository.create_session(&session).await?;

        info!(session_id = %session.id, mode = %session.mode, "Session created");
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SessionModel>, AppError> {
        self.repository.get_session(session_id).await
    }

    /// Moves a pending session to active
    #[instrument(skip(self))]
    pub async fn activate(&self, session_id: &str) -> Result<SessionModel, AppError> {
        self.transition(session_id, SessionStatus::Active, |_| {}).await
    }

    /// Ends an active session, recording the end time exactly once.
    ///
    /// An optional recording reference may be attached at this point; the
    /// recording blob itself lives in external storage.
    #[instrument(skip(self))]
    pub async fn end(
        &self,
        session_id: &str,
        recording_ref: Option<String>,
    ) -> Result<SessionModel, AppError> {
        self.transition(session_id, SessionStatus::Ended, |session| {
            session.ended_at = Some(Utc::now());
            if recording_ref.is_some() {
                session.recording_ref = recording_ref;
            }
        })
        .await
    }

    /// Moves an ended session to archived
    #[instrument(skip(self))]
    pub async fn archive(&self, session_id: &str) -> Result<SessionModel, AppError> {
        self.transition(session_id, SessionStatus::Archived, |_| {}).await
    }

    /// Sessions still active past the bound, for the reaper sweep
    pub async fn stale_sessions(&self, active_bound: Duration) -> Result<Vec<SessionModel>, AppError> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(active_bound)
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        self.repository.list_stale_sessions(cutoff).await
    }

    #[cfg(test)]
    pub(crate) async fn transition_lock_count(&self) -> usize {
        self.transition_locks.lock().await.len()
    }

    async fn transition<F>(
        &self,
        session_id: &str,
        target: SessionStatus,
        apply: F,
    ) -> Result<SessionModel, AppError>
    where
        F: FnOnce(&mut SessionModel),
    {
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;

        let mut session = self
            .repository
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        if !session.status.can_transition_to(target) {
            debug!(
                session_id = %session_id,
                from = %session.status,
                to = %target,
                "Rejected session transition"
            );
            return Err(AppError::InvalidTransition {
                from: session.status,
                to: target,
            });
        }

        let previous = session.status;
        session.status = target;
        apply(&mut session);
        self.repository.update_session(&session).await?;

        // Archived is final; any later transition fails the forward-only
        // check no matter which lock it holds, so the entry can go.
        if target == SessionStatus::Archived {
            self.transition_locks.lock().await.remove(session_id);
        }

        info!(
            session_id = %session_id,
            from = %previous,
            to = %target,
            "Session transitioned"
        );
        Ok(session)
    }
}
