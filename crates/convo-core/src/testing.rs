//! In-memory test doubles for the repository and inference client seams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use futures_util::stream;
use uuid::Uuid;

use convo_types::chat::{Message, Session, TokenUsage};
use convo_types::error::{RepositoryError, UpstreamError};
use convo_types::llm::{GenerationOutput, GenerationRequest, StreamEvent};

use crate::llm::{GenerationStream, InferenceClient};
use crate::session::SessionRepository;

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<Uuid, Session>,
    messages: Vec<Message>,
}

/// HashMap-backed [`SessionRepository`] mirroring the SQLite semantics:
/// ascending history ordered by `(created_at, id)`, limit as a
/// most-recent tail, and cascade delete of messages.
pub(crate) struct MemoryRepository {
    inner: StdMutex<MemoryState>,
    write_delay: Option<std::time::Duration>,
}

impl MemoryRepository {
    pub(crate) fn new() -> Self {
        Self {
            inner: StdMutex::new(MemoryState::default()),
            write_delay: None,
        }
    }

    /// A repository whose atomic message-and-touch writes take `delay`,
    /// for racing callers against in-flight persistence.
    pub(crate) fn with_slow_writes(delay: std::time::Duration) -> Self {
        Self {
            inner: StdMutex::new(MemoryState::default()),
            write_delay: Some(delay),
        }
    }

    pub(crate) fn backdate_last_accessed(&self, session_id: &Uuid, at: DateTime<Utc>) {
        let mut state = self.inner.lock().unwrap();
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.last_accessed = at;
        }
    }
}

impl SessionRepository for MemoryRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut state = self.inner.lock().unwrap();
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn fetch_session(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let state = self.inner.lock().unwrap();
        Ok(state.sessions.get(session_id).cloned())
    }

    async fn touch_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.inner.lock().unwrap();
        match state.sessions.get_mut(session_id) {
            Some(session) => {
                session.last_accessed = at;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete_session(&self, session_id: &Uuid) -> Result<(), RepositoryError> {
        let mut state = self.inner.lock().unwrap();
        if state.sessions.remove(session_id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        state.messages.retain(|m| m.session_id != *session_id);
        Ok(())
    }

    async fn delete_sessions_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.inner.lock().unwrap();
        let stale: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| s.last_accessed < cutoff)
            .map(|s| s.id)
            .collect();
        for id in &stale {
            state.sessions.remove(id);
        }
        state.messages.retain(|m| !stale.contains(&m.session_id));
        Ok(stale.len() as u64)
    }

    async fn insert_message(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut state = self.inner.lock().unwrap();
        if !state.sessions.contains_key(&message.session_id) {
            return Err(RepositoryError::NotFound);
        }
        state.messages.push(message.clone());
        Ok(())
    }

    async fn insert_message_and_touch(
        &self,
        message: &Message,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.inner.lock().unwrap();
        let Some(session) = state.sessions.get_mut(&message.session_id) else {
            return Err(RepositoryError::NotFound);
        };
        session.last_accessed = at;
        state.messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.inner.lock().unwrap();
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.session_id == *session_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if let Some(limit) = limit {
            let limit = limit.max(0) as usize;
            if messages.len() > limit {
                messages.drain(..messages.len() - limit);
            }
        }
        Ok(messages)
    }

    async fn count_messages(&self, session_id: &Uuid) -> Result<u64, RepositoryError> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == *session_id)
            .count() as u64)
    }

    async fn count_sessions(&self) -> Result<u64, RepositoryError> {
        Ok(self.inner.lock().unwrap().sessions.len() as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

enum StreamTail {
    Complete(Option<TokenUsage>),
    Error(fn() -> UpstreamError),
    Stall,
}

enum Behavior {
    Complete {
        content: String,
        usage: Option<TokenUsage>,
    },
    Echo,
    Fail(fn() -> UpstreamError),
    Stream {
        fragments: Vec<String>,
        tail: StreamTail,
    },
}

/// Scriptable [`InferenceClient`] that records every request it sees.
pub(crate) struct MockClient {
    behavior: Behavior,
    requests: Arc<StdMutex<Vec<GenerationRequest>>>,
}

impl MockClient {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            requests: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    pub(crate) fn completing(content: &str, usage: Option<TokenUsage>) -> Self {
        Self::new(Behavior::Complete {
            content: content.to_string(),
            usage,
        })
    }

    /// Replies `echo: <last user message>` to every request.
    pub(crate) fn echoing() -> Self {
        Self::new(Behavior::Echo)
    }

    pub(crate) fn failing(err: fn() -> UpstreamError) -> Self {
        Self::new(Behavior::Fail(err))
    }

    pub(crate) fn streaming_fragments(fragments: &[&str], usage: Option<TokenUsage>) -> Self {
        Self::new(Behavior::Stream {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            tail: StreamTail::Complete(usage),
        })
    }

    pub(crate) fn streaming_then_error(fragments: &[&str], err: fn() -> UpstreamError) -> Self {
        Self::new(Behavior::Stream {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            tail: StreamTail::Error(err),
        })
    }

    /// Emits the fragments, then never yields again.
    pub(crate) fn streaming_then_stall(fragments: &[&str]) -> Self {
        Self::new(Behavior::Stream {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            tail: StreamTail::Stall,
        })
    }

    pub(crate) fn requests(&self) -> Arc<StdMutex<Vec<GenerationRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl InferenceClient for MockClient {
    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.behavior {
            Behavior::Complete { content, usage } => Ok(GenerationOutput {
                content: content.clone(),
                usage: *usage,
            }),
            Behavior::Echo => {
                let last = request
                    .messages
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                Ok(GenerationOutput {
                    content: format!("echo: {last}"),
                    usage: None,
                })
            }
            Behavior::Fail(err) => Err(err()),
            Behavior::Stream { .. } => Err(UpstreamError::Unavailable(
                "mock scripted for streaming only".to_string(),
            )),
        }
    }

    fn stream(&self, request: GenerationRequest) -> GenerationStream {
        self.requests.lock().unwrap().push(request);
        match &self.behavior {
            Behavior::Stream { fragments, tail } => {
                let mut items: Vec<Result<StreamEvent, UpstreamError>> = fragments
                    .iter()
                    .map(|text| Ok(StreamEvent::Fragment { text: text.clone() }))
                    .collect();
                match tail {
                    StreamTail::Complete(usage) => {
                        items.push(Ok(StreamEvent::Completed {
                            content: fragments.concat(),
                            usage: *usage,
                        }));
                        Box::pin(stream::iter(items))
                    }
                    StreamTail::Error(err) => {
                        items.push(Err(err()));
                        Box::pin(stream::iter(items))
                    }
                    StreamTail::Stall => {
                        Box::pin(futures_util::StreamExt::chain(
                            stream::iter(items),
                            stream::pending(),
                        ))
                    }
                }
            }
            Behavior::Fail(err) => Box::pin(stream::iter(vec![Err(err())])),
            _ => Box::pin(stream::empty()),
        }
    }

    async fn healthy(&self) -> bool {
        !matches!(self.behavior, Behavior::Fail(_))
    }
}
