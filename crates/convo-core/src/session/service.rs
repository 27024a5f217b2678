//! Session lifecycle: creation, access with lazy expiry, deletion, and
//! message persistence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use convo_types::chat::{Message, Session, SessionMetadata};
use convo_types::error::{ChatError, RepositoryError};

use super::repository::SessionRepository;

/// Session operations on top of a [`SessionRepository`].
///
/// Every successful access through [`SessionService::get`] advances the
/// session's `last_accessed`; sessions idle longer than `timeout` are
/// removed on access and reported as not found.
pub struct SessionService<R> {
    repo: Arc<R>,
    timeout: Duration,
}

impl<R: SessionRepository> SessionService<R> {
    pub fn new(repo: Arc<R>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub async fn create(&self, metadata: Option<SessionMetadata>) -> Result<Session, ChatError> {
        let session = Session::new(metadata);
        self.repo.insert_session(&session).await?;
        info!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Load a session, expiring it lazily if it has been idle too long.
    ///
    /// On success the session has been touched and the returned value
    /// reflects the new `last_accessed`.
    pub async fn get(&self, session_id: &Uuid) -> Result<Session, ChatError> {
        let Some(mut session) = self.repo.fetch_session(session_id).await? else {
            return Err(ChatError::SessionNotFound);
        };

        let now = Utc::now();
        if session.is_expired(now, self.timeout) {
            debug!(session_id = %session_id, last_accessed = %session.last_accessed, "session expired, removing");
            if let Err(e) = self.repo.delete_session(session_id).await {
                if !matches!(e, RepositoryError::NotFound) {
                    warn!(session_id = %session_id, error = %e, "failed to remove expired session");
                }
            }
            return Err(ChatError::SessionNotFound);
        }

        self.repo.touch_session(session_id, now).await?;
        session.last_accessed = now;
        Ok(session)
    }

    pub async fn delete(&self, session_id: &Uuid) -> Result<(), ChatError> {
        self.repo.delete_session(session_id).await?;
        info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    /// History of a live session in ascending order. Validates (and
    /// touches) the session first, so expired sessions read as not found.
    pub async fn messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, ChatError> {
        self.get(session_id).await?;
        Ok(self.repo.list_messages(session_id, limit).await?)
    }

    pub async fn save_message(&self, message: &Message) -> Result<(), ChatError> {
        self.repo.insert_message(message).await?;
        Ok(())
    }

    /// Persist an assistant message and advance `last_accessed` atomically.
    ///
    /// Failures here are [`ChatError::Persistence`]: by the time this runs
    /// the response text has typically already reached the client.
    pub async fn save_assistant(&self, message: &Message) -> Result<(), ChatError> {
        self.repo
            .insert_message_and_touch(message, Utc::now())
            .await
            .map_err(|e| ChatError::Persistence(e.to_string()))
    }

    /// Remove every session idle past the timeout. Returns the count.
    pub async fn sweep_expired(&self) -> Result<u64, ChatError> {
        let Ok(timeout) = chrono::Duration::from_std(self.timeout) else {
            return Ok(0);
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(timeout) else {
            return Ok(0);
        };
        let removed = self.repo.delete_sessions_idle_since(cutoff).await?;
        if removed > 0 {
            info!(removed, "swept expired sessions");
        }
        Ok(removed)
    }
}
