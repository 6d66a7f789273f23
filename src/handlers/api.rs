use axum::{Json, extract::State};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Health check response body
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub instances: InstanceCounts,
}

/// Instance counts in the health response
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InstanceCounts {
    pub total: usize,
    pub running: usize,
}

/// Health check handler
///
/// Reports service liveness plus configured/running instance counts.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
))]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let total = state.manager.factory().list_instances().len();
    let running = state.manager.list_running_instances().await.len();

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        instances: InstanceCounts { total, running },
    })
}

/// System metrics handler
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/metrics",
    tag = "metrics",
    responses((status = 200, description = "Aggregate instance metrics"))
))]
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.manager.metrics().await)
}
