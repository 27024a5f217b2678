//! Persistence trait for sessions and messages.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use convo_types::chat::{Message, Session};
use convo_types::error::RepositoryError;

/// Storage abstraction for conversation state.
///
/// Implementations must treat messages as append-only and return history
/// ordered by `created_at` with the message id breaking ties, so that
/// messages inserted within the same timestamp tick keep insertion order
/// (ids are UUIDv7 and therefore time-sortable).
pub trait SessionRepository: Send + Sync {
    fn insert_session(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn fetch_session(
        &self,
        session_id: &Uuid,
    ) -> impl Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Advance `last_accessed`. Fails with `NotFound` if the session is gone.
    fn touch_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a session and all of its messages. Fails with `NotFound` if
    /// the session does not exist.
    fn delete_session(
        &self,
        session_id: &Uuid,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Bulk-delete sessions whose `last_accessed` is older than `cutoff`.
    /// Returns how many sessions were removed.
    fn delete_sessions_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    fn insert_message(
        &self,
        message: &Message,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert a message and advance the session's `last_accessed` as one
    /// atomic unit. Used for assistant messages so the session row and its
    /// history never disagree.
    fn insert_message_and_touch(
        &self,
        message: &Message,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Messages of a session in ascending causal order. When `limit` is
    /// set, returns the most recent `limit` messages (still ascending).
    fn list_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
    ) -> impl Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    fn count_messages(
        &self,
        session_id: &Uuid,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    fn count_sessions(&self) -> impl Future<Output = Result<u64, RepositoryError>> + Send;

    /// Cheap connectivity probe for health reporting.
    fn ping(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}
