//! Session control REST handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::engine::SessionInfo;
use crate::core::plugin::PluginMessage;
use crate::errors::app_error::AppResult;
use crate::state::AppState;

/// Request body for session start
#[derive(Debug, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StartSessionRequest {
    pub session_id: Option<String>,
}

/// Start a session for an instance, auto-starting the instance when needed
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances/{name}/session/start",
    tag = "sessions",
    params(("name" = String, Path, description = "Instance name")),
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session started"),
        (status = 409, description = "A session is already active")
    )
))]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<StartSessionRequest>>,
) -> AppResult<Json<SessionInfo>> {
    let session_id = body.and_then(|Json(request)| request.session_id);
    let info = state.manager.start_session(&name, session_id).await?;
    Ok(Json(info))
}

/// Stop the active session of an instance
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances/{name}/session/stop",
    tag = "sessions",
    params(("name" = String, Path, description = "Instance name")),
    responses(
        (status = 200, description = "Session stopped with final metrics"),
        (status = 409, description = "No active session")
    )
))]
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let result = state.manager.stop_session(&name).await?;
    Ok(Json(result))
}

/// Process a message through an instance's plugin pipeline
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances/{name}/message",
    tag = "sessions",
    params(("name" = String, Path, description = "Instance name")),
    responses(
        (status = 200, description = "Pipeline response"),
        (status = 409, description = "No active session")
    )
))]
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(message): Json<PluginMessage>,
) -> AppResult<Json<serde_json::Value>> {
    let response = state.manager.process_message(&name, message).await?;
    Ok(Json(response))
}
