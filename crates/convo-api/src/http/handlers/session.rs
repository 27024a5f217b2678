//! Session CRUD HTTP handlers.
//!
//! Endpoints:
//! - POST   /api/sessions               - Create a session
//! - GET    /api/sessions/{id}          - Get a single session
//! - GET    /api/sessions/{id}/messages - Get messages for a session
//! - DELETE /api/sessions/{id}          - Delete a session and its messages

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use convo_core::session::SessionRepository;
use convo_types::chat::SessionMetadata;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for session creation. The whole body is optional.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Opaque caller metadata, stored and echoed back verbatim.
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
}

/// Query parameters for message listing.
#[derive(Debug, Default, Deserialize)]
pub struct MessageListQuery {
    /// Most recent N messages; absent means the full history.
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// POST /api/sessions - Create a new session.
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let metadata = body.and_then(|Json(b)| b.metadata);
    let session = state.sessions.create(metadata).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let session_json = serde_json::to_value(&session)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(session_json, request_id, elapsed)
        .with_link("self", &format!("/api/sessions/{}", session.id))
        .with_link("messages", &format!("/api/sessions/{}/messages", session.id));

    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/sessions/{id} - Get a session by ID.
///
/// Accessing a session counts as activity: `last_accessed` moves forward,
/// and idle sessions past the timeout read as 404.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state.sessions.get(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let session_json = serde_json::to_value(&session)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let resp = ApiResponse::success(session_json, request_id, elapsed)
        .with_link("self", &format!("/api/sessions/{}", session.id))
        .with_link("messages", &format!("/api/sessions/{}/messages", session.id));

    Ok(Json(resp))
}

/// GET /api/sessions/{id}/messages - Get messages for a session.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let messages = state.sessions.messages(&sid, query.limit).await?;
    let total_count = state
        .sessions
        .repo()
        .count_messages(&sid)
        .await
        .map_err(|e| AppError::Chat(e.into()))?;

    let elapsed = start.elapsed().as_millis() as u64;
    let data = serde_json::json!({
        "session_id": sid,
        "messages": messages,
        "total_count": total_count,
    });
    let resp = ApiResponse::success(data, request_id, elapsed)
        .with_link("self", &format!("/api/sessions/{session_id}/messages"))
        .with_link("session", &format!("/api/sessions/{session_id}"));

    Ok(Json(resp))
}

/// DELETE /api/sessions/{id} - Delete a session and its messages.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    state.sessions.delete(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({"deleted": true, "session_id": session_id}),
        request_id,
        elapsed,
    );

    Ok(Json(resp))
}
