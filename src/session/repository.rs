use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{SessionMode, SessionModel, SessionStatus};
use crate::shared::AppError;

/// Trait for session lifecycle store operations
#[async_trait]
pub trait SessionRepository {
    async fn create_session(&self, session: &SessionModel) -> Result<(), AppError>;
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError>;
    async fn update_session(&self, session: &SessionModel) -> Result<(), AppError>;

    /// Returns sessions still marked active that were created before the
    /// cutoff; input for the stale session reaper.
    async fn list_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionModel>, AppError>;
}

/// In-memory implementation of SessionRepository for development and testing
///
/// Data is stored in memory and lost when the process restarts.
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, SessionModel>>,
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the current number of sessions in the repository
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    #[instrument(skip(self, session))]
    async fn create_session(&self, session: &SessionModel) -> Result<(), AppError> {
        debug!(session_id = %session.id, host_id = %session.host_id, "Creating session in memory");

        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&session.id) {
            warn!(session_id = %session.id, "Session already exists in memory");
            return Err(AppError::DatabaseError(
                "Session already exists".to_string(),
            ));
        }
        sessions.insert(session.id.clone(), session.clone());

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError> {
        let sessions = self.sessions.lock().unwrap();
        let session = sessions.get(session_id).cloned();

        match &session {
            Some(s) => debug!(session_id = %session_id, status = %s.status, "Session found in memory"),
            None => debug!(session_id = %session_id, "Session not found in memory"),
        }

        Ok(session)
    }

    #[instrument(skip(self, session))]
    async fn update_session(&self, session: &SessionModel) -> Result<(), AppError> {
        debug!(session_id = %session.id, status = %session.status, "Updating session in memory");

        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.contains_key(&session.id) {
            warn!(session_id = %session.id, "Session not found for update in memory");
            return Err(AppError::NotFound("Session not found".to_string()));
        }
        sessions.insert(session.id.clone(), session.clone());

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionModel>, AppError> {
        let sessions = self.sessions.lock().unwrap();
        let stale: Vec<SessionModel> = sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active && s.created_at < cutoff)
            .cloned()
            .collect();

        debug!(count = stale.len(), "Listed stale sessions from memory");
        Ok(stale)
    }
}

/// PostgreSQL implementation of the session lifecycle store
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_session(row: &sqlx::postgres::PgRow) -> Result<SessionModel, AppError> {
        let mode_text: String = row
            .try_get("mode")
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        let status_text: String = row
            .try_get("status")
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(SessionModel {
            id: row
                .try_get("id")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            title: row
                .try_get("title")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            host_id: row
                .try_get("host_id")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            mode: SessionMode::from_str(&mode_text)
                .map_err(|_| AppError::DatabaseError(format!("Unknown mode: {}", mode_text)))?,
            status: SessionStatus::from_str(&status_text)
                .map_err(|_| AppError::DatabaseError(format!("Unknown status: {}", status_text)))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            ended_at: row
                .try_get("ended_at")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
            recording_ref: row
                .try_get("recording_ref")
                .map_err(|e| AppError::DatabaseError(e.to_string()))?,
        })
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    #[instrument(skip(self, session))]
    async fn create_session(&self, session: &SessionModel) -> Result<(), AppError> {
        debug!(session_id = %session.id, "Creating session in database");

        sqlx::query(
            "INSERT INTO sessions (id, title, host_id, mode, status, created_at, ended_at, recording_ref) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&session.id)
        .bind(&session.title)
        .bind(&session.host_id)
        .bind(session.mode.to_string())
        .bind(session.status.to_string())
        .bind(session.created_at)
        .bind(session.ended_at)
        .bind(&session.recording_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionModel>, AppError> {
        let row = sqlx::query(
            "SELECT id, title, host_id, mode, status, created_at, ended_at, recording_ref \
             FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        row.map(|r| Self::row_to_session(&r)).transpose()
    }

    #[instrument(skip(self, session))]
    async fn update_session(&self, session: &SessionModel) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET title = $2, status = $3, ended_at = $4, recording_ref = $5 \
             WHERE id = $1",
        )
        .bind(&session.id)
        .bind(&session.title)
        .bind(session.status.to_string())
        .bind(session.ended_at)
        .bind(&session.recording_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            warn!(session_id = %session.id, "Session not found for update in database");
            return Err(AppError::NotFound("Session not found".to_string()));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, title, host_id, mode, status, created_at, ended_at, recording_ref \
             FROM sessions WHERE status = 'active' AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.iter().map(Self::row_to_session).collect()
    }
}
