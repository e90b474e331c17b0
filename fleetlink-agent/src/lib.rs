//! Local status API for a headless FleetLink session.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use fleetlink_sync::{ConnectionState, FeedSnapshot, Session};
use fleetlink_types::QueuedMutation;
use serde::{Deserialize, Serialize};

/// State shared by every handler.
pub struct AgentState {
    pub session: Session,
    pub agent_version: String,
}

impl AgentState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            agent_version: format!("fleetlink-agent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusResponse {
    pub session_id: String,
    pub connection_state: ConnectionState,
    pub online: bool,
    pub reconnect_attempts: u32,
    pub queued_mutations: usize,
    pub draining: bool,
    pub agent_version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn unavailable(e: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

async fn status_handler(
    State(state): State<Arc<AgentState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = &state.session;
    let queued_mutations = session.store().queue_len().await.map_err(unavailable)?;
    Ok(Json(StatusResponse {
        session_id: session.id().to_string(),
        connection_state: session.connection().state(),
        online: session.monitor().is_online(),
        reconnect_attempts: session.connection().reconnect_attempts(),
        queued_mutations,
        draining: session.coordinator().is_draining(),
        agent_version: state.agent_version.clone(),
    }))
}

async fn notifications_handler(State(state): State<Arc<AgentState>>) -> Json<FeedSnapshot> {
    Json(state.session.feed().snapshot())
}

async fn queue_handler(
    State(state): State<Arc<AgentState>>,
) -> Result<Json<Vec<QueuedMutation>>, ApiError> {
    let queue = state.session.store().drain_all().await.map_err(unavailable)?;
    Ok(Json(queue))
}

/// Build the HTTP API router for the given session.
pub fn build_router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/notifications", get(notifications_handler))
        .route("/api/v1/queue", get(queue_handler))
        .with_state(state)
}
