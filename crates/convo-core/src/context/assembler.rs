//! Bounded context window assembly.
//!
//! The window is the last `max_messages` persisted turns of a session,
//! excluding the user message of the turn in flight (the caller appends
//! that separately so it is never double-counted against the bound).

use tracing::debug;
use uuid::Uuid;

use convo_types::chat::{Message, MessageRole};
use convo_types::error::RepositoryError;
use convo_types::llm::ContextMessage;

use crate::session::SessionRepository;

pub struct ContextAssembler {
    max_messages: usize,
    system_prompt: Option<String>,
}

impl ContextAssembler {
    pub fn new(max_messages: usize, system_prompt: Option<String>) -> Self {
        Self {
            max_messages,
            system_prompt,
        }
    }

    /// Fetch and window the history of `session_id`.
    ///
    /// `exclude` is the id of the current turn's user message, which has
    /// already been persisted but belongs after the window, not in it.
    pub async fn assemble<R: SessionRepository>(
        &self,
        repo: &R,
        session_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ContextMessage>, RepositoryError> {
        // One extra row covers the excluded in-flight message sitting at
        // the tail of the fetch.
        let history = if self.max_messages == 0 {
            Vec::new()
        } else {
            repo.list_messages(&session_id, Some(self.max_messages as i64 + 1))
                .await?
        };
        let window = self.window(history, exclude);
        debug!(
            session_id = %session_id,
            turns = window.len(),
            "assembled context window"
        );
        Ok(window)
    }

    /// Pure windowing over an ascending history slice.
    pub fn window(&self, history: Vec<Message>, exclude: Option<Uuid>) -> Vec<ContextMessage> {
        let mut turns: Vec<ContextMessage> = history
            .into_iter()
            .filter(|m| Some(m.id) != exclude)
            .map(|m| ContextMessage {
                role: m.role,
                content: m.content,
            })
            .collect();

        if turns.len() > self.max_messages {
            let excess = turns.len() - self.max_messages;
            turns.drain(..excess);
        }

        if let Some(prompt) = &self.system_prompt {
            let has_system = turns
                .first()
                .is_some_and(|t| t.role == MessageRole::System);
            if !has_system {
                turns.insert(
                    0,
                    ContextMessage {
                        role: MessageRole::System,
                        content: prompt.clone(),
                    },
                );
            }
        }

        turns
    }
}
