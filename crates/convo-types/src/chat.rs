//! Session and message types.
//!
//! A `Session` is a persisted conversation context; a `Message` is one
//! append-only entry inside it, ordered by `created_at` (UUIDv7 ids break
//! timestamp ties in insertion order).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Opaque per-session metadata supplied by the caller at creation.
///
/// Never interpreted by the relay; stored and echoed back verbatim.
pub type SessionMetadata = serde_json::Map<String, serde_json::Value>;

/// Role of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// Token accounting for one assistant response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A conversation session with an expiry policy.
///
/// `last_accessed` moves forward on every read or write touching the
/// session; sessions idle past the configured timeout are expired lazily
/// on access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "session_id")]
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub metadata: SessionMetadata,
}

impl Session {
    /// Create a fresh session with `created_at == last_accessed == now`.
    pub fn new(metadata: Option<SessionMetadata>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            created_at: now,
            last_accessed: now,
            metadata: metadata.unwrap_or_default(),
        }
    }

    /// Whether the session has been idle longer than `timeout` as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => now - self.last_accessed > timeout,
            Err(_) => false,
        }
    }
}

/// A single message within a session. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "message_id")]
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Present only on assistant messages whose generation finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// False when the assistant response was cut short mid-stream and only
    /// the received fragments were persisted.
    pub complete: bool,
}

impl Message {
    /// Build a user message for a turn.
    pub fn user(session_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            role: MessageRole::User,
            content,
            created_at: Utc::now(),
            token_usage: None,
            complete: true,
        }
    }

    /// Build an assistant message. `complete = false` marks a response that
    /// was interrupted mid-stream.
    pub fn assistant(
        session_id: Uuid,
        content: String,
        token_usage: Option<TokenUsage>,
        complete: bool,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            role: MessageRole::Assistant,
            content,
            created_at: Utc::now(),
            token_usage,
            complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let s = role.to_string();
            let parsed: MessageRole = s.parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_message_role_rejects_unknown() {
        assert!("tool".parse::<MessageRole>().is_err());
        assert!("".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_message_role_serde() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let parsed: MessageRole = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, MessageRole::Assistant);
    }

    #[test]
    fn test_new_session_timestamps() {
        let session = Session::new(None);
        assert_eq!(session.created_at, session.last_accessed);
        assert!(session.metadata.is_empty());
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session::new(None);
        let timeout = Duration::from_secs(3600);

        assert!(!session.is_expired(Utc::now(), timeout));

        session.last_accessed = Utc::now() - chrono::Duration::hours(2);
        assert!(session.is_expired(Utc::now(), timeout));
    }

    #[test]
    fn test_session_serializes_id_field() {
        let session = Session::new(None);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"session_id\""));
    }

    #[test]
    fn test_user_message_has_no_usage() {
        let msg = Message::user(Uuid::now_v7(), "hello".to_string());
        assert_eq!(msg.role, MessageRole::User);
        assert!(msg.token_usage.is_none());
        assert!(msg.complete);
    }

    #[test]
    fn test_partial_assistant_message() {
        let msg = Message::assistant(Uuid::now_v7(), "truncat".to_string(), None, false);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert!(!msg.complete);

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"complete\":false"));
        // token_usage is omitted when absent, not serialized as null.
        assert!(!json.contains("token_usage"));
    }
}
