//! Chat endpoints: whole-response and SSE streaming.
//!
//! POST /api/chat        — whole-response turn
//! POST /api/chat/stream — SSE streaming turn
//!
//! SSE event types:
//! - `delta` — incremental text: `{ "text": "..." }`
//! - `usage` — token usage: `{ "prompt_tokens": N, "completion_tokens": N }`
//! - `done`  — stream complete: the persisted assistant message as JSON
//! - `error` — error occurred: `{ "message": "..." }`

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::Stream;
use tracing::Instrument;
use uuid::Uuid;

use convo_core::turn::TurnStreamEvent;
use convo_observe::genai_attrs;
use convo_types::llm::GenerationParams;

use super::session::parse_uuid;
use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for both chat endpoints.
///
/// The generation option set is closed: unknown fields are rejected at
/// deserialization instead of being silently dropped.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatTurnRequest {
    /// Session to run the turn against.
    pub session_id: String,
    /// The user message.
    pub message: String,
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub do_sample: Option<bool>,
}

/// Merge per-request overrides onto the configured defaults.
fn resolve_params(defaults: &GenerationParams, body: &ChatTurnRequest) -> GenerationParams {
    GenerationParams {
        max_new_tokens: body.max_new_tokens.unwrap_or(defaults.max_new_tokens),
        temperature: body.temperature.unwrap_or(defaults.temperature),
        do_sample: body.do_sample.unwrap_or(defaults.do_sample),
    }
}

/// POST /api/chat — whole-response turn.
///
/// Returns the persisted assistant message once generation and
/// persistence both finished.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatTurnRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&body.session_id)?;
    let params = resolve_params(&state.settings.relay.default_params, &body);

    let span = tracing::info_span!(
        "chat",
        { genai_attrs::GEN_AI_OPERATION_NAME } = genai_attrs::OP_CHAT,
        { genai_attrs::GEN_AI_PROVIDER_NAME } = genai_attrs::PROVIDER_LOCAL,
        { genai_attrs::GEN_AI_CONVERSATION_ID } = tracing::field::display(sid),
        { genai_attrs::GEN_AI_REQUEST_MAX_TOKENS } = params.max_new_tokens,
        { genai_attrs::GEN_AI_REQUEST_TEMPERATURE } = params.temperature,
        { genai_attrs::GEN_AI_USAGE_INPUT_TOKENS } = tracing::field::Empty,
        { genai_attrs::GEN_AI_USAGE_OUTPUT_TOKENS } = tracing::field::Empty,
    );
    let message = state
        .coordinator
        .chat(sid, body.message, params)
        .instrument(span.clone())
        .await?;
    if let Some(usage) = &message.token_usage {
        span.record(genai_attrs::GEN_AI_USAGE_INPUT_TOKENS, usage.prompt_tokens);
        span.record(
            genai_attrs::GEN_AI_USAGE_OUTPUT_TOKENS,
            usage.completion_tokens,
        );
    }

    let elapsed = start.elapsed().as_millis() as u64;
    let message_json =
        serde_json::to_value(&message).map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(message_json, request_id, elapsed)
        .with_link("session", &format!("/api/sessions/{sid}"));

    Ok(Json(resp))
}

/// POST /api/chat/stream — SSE streaming turn.
///
/// Validation and user-message persistence run before the response
/// starts, so those failures arrive as normal HTTP errors. Once the SSE
/// stream is open, failures surface as an `error` event instead.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatTurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let sid = parse_uuid(&body.session_id)?;
    let params = resolve_params(&state.settings.relay.default_params, &body);

    let span = tracing::info_span!(
        "chat_stream",
        { genai_attrs::GEN_AI_OPERATION_NAME } = genai_attrs::OP_CHAT_STREAM,
        { genai_attrs::GEN_AI_PROVIDER_NAME } = genai_attrs::PROVIDER_LOCAL,
        { genai_attrs::GEN_AI_CONVERSATION_ID } = tracing::field::display(sid),
        { genai_attrs::GEN_AI_REQUEST_MAX_TOKENS } = params.max_new_tokens,
        { genai_attrs::GEN_AI_REQUEST_TEMPERATURE } = params.temperature,
    );
    let turn = state
        .coordinator
        .chat_stream(sid, body.message, params)
        .instrument(span)
        .await?;

    let sse_stream = async_stream::stream! {
        let mut turn = std::pin::pin!(turn);

        while let Some(event) = turn.next().await {
            match event {
                TurnStreamEvent::Delta { text } => {
                    let data = serde_json::json!({ "text": text });
                    yield Ok::<_, Infallible>(
                        Event::default().event("delta").data(data.to_string()),
                    );
                }
                TurnStreamEvent::Done { message } => {
                    if let Some(usage) = message.token_usage {
                        let data = serde_json::to_string(&usage).unwrap_or_default();
                        yield Ok(Event::default().event("usage").data(data));
                    }
                    let data = serde_json::to_string(&message).unwrap_or_default();
                    yield Ok(Event::default().event("done").data(data));
                }
                TurnStreamEvent::Error { message } => {
                    let data = serde_json::json!({ "message": message });
                    yield Ok(Event::default().event("error").data(data.to_string()));
                }
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_generation_option_rejected() {
        let err = serde_json::from_str::<ChatTurnRequest>(
            r#"{"session_id":"x","message":"hi","top_p":0.9}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("top_p"));
    }

    #[test]
    fn test_omitted_options_take_defaults() {
        let body: ChatTurnRequest =
            serde_json::from_str(r#"{"session_id":"x","message":"hi"}"#).unwrap();
        let defaults = GenerationParams {
            max_new_tokens: 256,
            temperature: 0.7,
            do_sample: true,
        };
        let params = resolve_params(&defaults, &body);
        assert_eq!(params.max_new_tokens, 256);
        assert!((params.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_overrides_merge() {
        let body: ChatTurnRequest = serde_json::from_str(
            r#"{"session_id":"x","message":"hi","max_new_tokens":32,"do_sample":false}"#,
        )
        .unwrap();
        let defaults = GenerationParams {
            max_new_tokens: 256,
            temperature: 0.7,
            do_sample: true,
        };
        let params = resolve_params(&defaults, &body);
        assert_eq!(params.max_new_tokens, 32);
        assert!(!params.do_sample);
        assert!((params.temperature - 0.7).abs() < f64::EPSILON);
    }
}
