//! Wire types for the upstream backend's HTTP interface.
//!
//! Whole-response: `POST {base}/chat` returning `{"response", "usage"}`.
//! Streaming: `POST {base}/chat/stream` emitting SSE data lines that are
//! type-tagged JSON objects, terminated by a literal `[DONE]` line.

use serde::{Deserialize, Serialize};

use convo_types::chat::TokenUsage;
use convo_types::llm::{ContextMessage, GenerationRequest};

/// Request body for both `/chat` and `/chat/stream`.
#[derive(Debug, Serialize)]
pub(crate) struct UpstreamChatRequest<'a> {
    pub messages: &'a [ContextMessage],
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub do_sample: bool,
}

impl<'a> From<&'a GenerationRequest> for UpstreamChatRequest<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self {
            messages: &request.messages,
            max_new_tokens: request.params.max_new_tokens,
            temperature: request.params.temperature,
            do_sample: request.params.do_sample,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl From<UpstreamUsage> for TokenUsage {
    fn from(u: UpstreamUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }
    }
}

/// Whole-response body from `/chat`.
#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamChatResponse {
    pub response: String,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

/// One SSE data line from `/chat/stream`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum UpstreamStreamChunk {
    /// Incremental fragment. Some backends also send the running
    /// accumulation, which we ignore in favor of our own.
    Chunk {
        #[serde(default)]
        text: String,
    },
    /// Terminal event with the aggregate response and usage.
    Complete {
        full_response: String,
        #[serde(default)]
        usage: Option<UpstreamUsage>,
    },
    /// Upstream-reported failure mid-stream.
    Error { message: String },
}
