//! Health endpoint probing the database and the upstream backend.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use convo_core::llm::InferenceClient;
use convo_core::session::SessionRepository;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// `healthy` when both probes pass, `degraded` otherwise.
    pub status: &'static str,
    pub timestamp: String,
    pub upstream_available: bool,
    pub database_connected: bool,
}

/// GET /api/health - Liveness plus dependency probes. Always 200; the
/// body says which dependency is down.
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let upstream_available = state.client.healthy().await;
    let database_connected = state.sessions.repo().ping().await.is_ok();

    let status = if upstream_available && database_connected {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        upstream_available,
        database_connected,
    })
}
