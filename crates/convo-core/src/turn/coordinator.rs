//! Turn coordination: one chat exchange from validation through
//! persistence, serialized per session.
//!
//! A turn is user-message persistence, context assembly, the upstream
//! call, and assistant-message persistence. Turns on the same session
//! never interleave; turns on different sessions proceed concurrently.

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use convo_types::chat::Message;
use convo_types::config::RelayConfig;
use convo_types::error::ChatError;
use convo_types::llm::{ContextMessage, GenerationParams, GenerationRequest, StreamEvent};

use crate::context::ContextAssembler;
use crate::llm::InferenceClient;
use crate::session::{SessionRepository, SessionService};

/// Boxed event stream handed to the transport layer for one turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnStreamEvent> + Send + 'static>>;

/// Events emitted to the downstream consumer of a streaming turn.
#[derive(Debug)]
pub enum TurnStreamEvent {
    /// An incremental text fragment, relayed as soon as it arrives.
    Delta { text: String },
    /// Terminal success: the persisted assistant message, fragments
    /// concatenated, usage attached when the backend reported it.
    Done { message: Message },
    /// Terminal failure after the stream already started.
    Error { message: String },
}

/// Registry of per-session turn locks. Entries are created on demand and
/// removed again once the map holds the only reference, so the registry
/// tracks sessions with a turn in flight rather than every session ever
/// chatted with.
type TurnLocks = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

fn release_turn_lock(locks: &TurnLocks, session_id: &Uuid) {
    locks.remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
}

pub struct TurnCoordinator<R, L> {
    sessions: Arc<SessionService<R>>,
    client: Arc<L>,
    assembler: ContextAssembler,
    locks: TurnLocks,
    stream_idle_timeout: Duration,
    max_message_chars: usize,
}

impl<R, L> TurnCoordinator<R, L>
where
    R: SessionRepository + 'static,
    L: InferenceClient,
{
    pub fn new(sessions: Arc<SessionService<R>>, client: Arc<L>, config: &RelayConfig) -> Self {
        Self {
            sessions,
            client,
            assembler: ContextAssembler::new(
                config.max_context_messages,
                config.system_prompt.clone(),
            ),
            locks: Arc::new(DashMap::new()),
            stream_idle_timeout: config.stream_idle_timeout,
            max_message_chars: config.max_message_chars,
        }
    }

    fn turn_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Shared front half of a turn: session validation (which touches),
    /// input validation, user-message persistence, and context assembly.
    /// Runs with the session's turn lock already held.
    async fn begin_turn(
        &self,
        session_id: Uuid,
        text: &str,
        params: GenerationParams,
    ) -> Result<(Message, GenerationRequest), ChatError> {
        self.sessions.get(&session_id).await?;

        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }
        let chars = text.chars().count();
        if chars > self.max_message_chars {
            return Err(ChatError::InvalidInput(format!(
                "message of {chars} characters exceeds the {} character limit",
                self.max_message_chars
            )));
        }
        params.validate().map_err(ChatError::InvalidInput)?;

        let user = Message::user(session_id, text.to_string());
        self.sessions.save_message(&user).await?;

        let mut messages = self
            .assembler
            .assemble(self.sessions.repo(), session_id, Some(user.id))
            .await?;
        messages.push(ContextMessage {
            role: user.role,
            content: user.content.clone(),
        });

        debug!(
            session_id = %session_id,
            context_turns = messages.len(),
            "turn prepared"
        );
        Ok((user, GenerationRequest { messages, params }))
    }

    /// One whole-response turn.
    ///
    /// On upstream failure the user message stays persisted and the error
    /// maps to its [`ChatError`] variant. On persistence failure after a
    /// successful generation the caller gets [`ChatError::Persistence`].
    pub async fn chat(
        &self,
        session_id: Uuid,
        text: String,
        params: GenerationParams,
    ) -> Result<Message, ChatError> {
        let lock = self.turn_lock(session_id);
        let turn = lock.lock().await;

        let result = async {
            let (_user, request) = self.begin_turn(session_id, &text, params).await?;
            let output = self.client.complete(&request).await?;

            let assistant = Message::assistant(session_id, output.content, output.usage, true);
            if let Err(e) = self.sessions.save_assistant(&assistant).await {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "assistant message lost after successful generation; history is inconsistent"
                );
                return Err(e);
            }
            Ok(assistant)
        }
        .await;

        drop(turn);
        drop(lock);
        release_turn_lock(&self.locks, &session_id);
        result
    }

    /// One streaming turn.
    ///
    /// Validation and user-message persistence happen before this returns,
    /// so pre-stream failures surface as a plain `Err` and nothing has
    /// been sent downstream yet. The returned stream holds the session's
    /// turn lock until the turn is finalized, including the partial
    /// persistence that runs when the consumer disconnects mid-stream.
    pub async fn chat_stream(
        &self,
        session_id: Uuid,
        text: String,
        params: GenerationParams,
    ) -> Result<TurnStream, ChatError> {
        let lock = self.turn_lock(session_id);
        let turn = lock.lock_owned().await;

        let (_user, request) = match self.begin_turn(session_id, &text, params).await {
            Ok(prepared) => prepared,
            Err(e) => {
                drop(turn);
                release_turn_lock(&self.locks, &session_id);
                return Err(e);
            }
        };
        let upstream = self.client.stream(request);

        Ok(relay_turn(
            Arc::clone(&self.sessions),
            session_id,
            upstream,
            self.stream_idle_timeout,
            turn,
            Arc::clone(&self.locks),
        ))
    }
}

/// Persist an assistant message on a detached task that keeps holding the
/// turn lock until the write is durable. The spawned task is immune to the
/// downstream consumer dropping the turn stream mid-await.
fn persist_detached<R>(
    sessions: Arc<SessionService<R>>,
    message: Message,
    turn: Option<OwnedMutexGuard<()>>,
    locks: TurnLocks,
) -> tokio::task::JoinHandle<Result<(), ChatError>>
where
    R: SessionRepository + 'static,
{
    tokio::spawn(async move {
        let result = sessions.save_assistant(&message).await;
        drop(turn);
        release_turn_lock(&locks, &message.session_id);
        result
    })
}

/// Drive the upstream stream, tee fragments downstream while
/// accumulating them, and persist the assistant message at the end.
///
/// The accumulation buffer is shared with a drop guard: if the consumer
/// drops the stream mid-turn, whatever was relayed so far is persisted as
/// a partial assistant message from the guard's destructor.
fn relay_turn<R>(
    sessions: Arc<SessionService<R>>,
    session_id: Uuid,
    mut upstream: crate::llm::GenerationStream,
    idle_timeout: Duration,
    turn: OwnedMutexGuard<()>,
    locks: TurnLocks,
) -> TurnStream
where
    R: SessionRepository + 'static,
{
    let accumulated = Arc::new(StdMutex::new(String::new()));
    let mut finalizer = PartialTurnGuard {
        sessions: Arc::clone(&sessions),
        session_id,
        accumulated: Arc::clone(&accumulated),
        armed: true,
        turn: Some(turn),
        locks: Arc::clone(&locks),
    };

    Box::pin(async_stream::stream! {
        let mut usage = None;
        let mut completed = false;
        let mut interruption: Option<String> = None;

        loop {
            match tokio::time::timeout(idle_timeout, upstream.next()).await {
                Err(_) => {
                    interruption = Some(format!(
                        "no data from upstream for {}s",
                        idle_timeout.as_secs()
                    ));
                    break;
                }
                Ok(None) => {
                    interruption = Some("upstream closed before terminal event".to_string());
                    break;
                }
                Ok(Some(Err(e))) => {
                    interruption = Some(e.to_string());
                    break;
                }
                Ok(Some(Ok(StreamEvent::Fragment { text }))) => {
                    accumulated.lock().unwrap().push_str(&text);
                    yield TurnStreamEvent::Delta { text };
                }
                Ok(Some(Ok(StreamEvent::Completed { content, usage: reported }))) => {
                    // The relayed fragments are the record of what the
                    // client saw; the terminal event only contributes
                    // usage, plus the content when nothing was fragmented.
                    let mut acc = accumulated.lock().unwrap();
                    if acc.is_empty() {
                        acc.push_str(&content);
                    }
                    drop(acc);
                    usage = reported;
                    completed = true;
                    break;
                }
            }
        }

        // From here on the write is owned by a detached task, so dropping
        // this stream can no longer cancel it. The guard stands down; the
        // detached task also inherits the turn lock.
        let content = accumulated.lock().unwrap().clone();
        finalizer.disarm();
        let turn = finalizer.take_turn();

        if completed {
            let message = Message::assistant(session_id, content, usage, true);
            let persisted =
                persist_detached(sessions, message.clone(), turn, locks).await;
            match persisted {
                Ok(Ok(())) => yield TurnStreamEvent::Done { message },
                Ok(Err(e)) => {
                    warn!(
                        session_id = %session_id,
                        error = %e,
                        "assistant message lost after stream delivery; history is inconsistent"
                    );
                    yield TurnStreamEvent::Error { message: e.to_string() };
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "persistence task failed");
                    yield TurnStreamEvent::Error { message: e.to_string() };
                }
            }
        } else {
            let reason = interruption.unwrap_or_default();
            warn!(session_id = %session_id, reason = %reason, "generation stream interrupted");
            if !content.is_empty() {
                let partial = Message::assistant(session_id, content, None, false);
                match persist_detached(sessions, partial, turn, locks).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(
                            session_id = %session_id,
                            error = %e,
                            "failed to persist partial response after interruption"
                        );
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "persistence task failed");
                    }
                }
            } else {
                drop(turn);
                release_turn_lock(&locks, &session_id);
            }
            yield TurnStreamEvent::Error { message: format!("stream interrupted: {reason}") };
        }
    })
}

/// Persists accumulated fragments when a streaming turn is dropped before
/// it finalizes itself (downstream consumer disconnected).
struct PartialTurnGuard<R: SessionRepository + 'static> {
    sessions: Arc<SessionService<R>>,
    session_id: Uuid,
    accumulated: Arc<StdMutex<String>>,
    armed: bool,
    turn: Option<OwnedMutexGuard<()>>,
    locks: TurnLocks,
}

impl<R: SessionRepository + 'static> PartialTurnGuard<R> {
    fn disarm(&mut self) {
        self.armed = false;
    }

    fn take_turn(&mut self) -> Option<OwnedMutexGuard<()>> {
        self.turn.take()
    }
}

impl<R: SessionRepository + 'static> Drop for PartialTurnGuard<R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let content = self
            .accumulated
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let turn = self.turn.take();
        let session_id = self.session_id;
        if content.is_empty() {
            drop(turn);
            release_turn_lock(&self.locks, &session_id);
            return;
        }

        let sessions = Arc::clone(&self.sessions);
        let locks = Arc::clone(&self.locks);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let partial = Message::assistant(session_id, content, None, false);
                    if let Err(e) = sessions.save_assistant(&partial).await {
                        warn!(
                            session_id = %session_id,
                            error = %e,
                            "failed to persist partial response after disconnect"
                        );
                    } else {
                        debug!(session_id = %session_id, "persisted partial response after disconnect");
                    }
                    // The turn lock is released only once the partial
                    // message is durable.
                    drop(turn);
                    release_turn_lock(&locks, &session_id);
                });
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    "stream dropped outside a runtime; partial response not persisted"
                );
            }
        }
    }
}
