use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, instances, sessions};
use crate::state::AppState;
use std::sync::Arc;

/// REST API router.
///
/// Everything under `/api` goes through the auth middleware when
/// authentication is enabled; the health endpoint is additionally exposed on
/// the public router in main.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(api::health_check))
        .route("/api/metrics", get(api::metrics))
        .route(
            "/api/instances",
            get(instances::list_instances).post(instances::create_instance),
        )
        .route(
            "/api/instances/{name}",
            delete(instances::delete_instance),
        )
        .route(
            "/api/instances/{name}/start",
            post(instances::start_instance),
        )
        .route("/api/instances/{name}/stop", post(instances::stop_instance))
        .route(
            "/api/instances/{name}/status",
            get(instances::instance_status),
        )
        .route(
            "/api/instances/{name}/config",
            get(instances::instance_config),
        )
        .route(
            "/api/instances/{name}/validate",
            get(instances::validate_instance),
        )
        .route(
            "/api/instances/{name}/export",
            post(instances::export_instance),
        )
        .route(
            "/api/instances/{name}/session/start",
            post(sessions::start_session),
        )
        .route(
            "/api/instances/{name}/session/stop",
            post(sessions::stop_session),
        )
        .route(
            "/api/instances/{name}/message",
            post(sessions::post_message),
        )
        .route("/api/templates", get(instances::list_templates))
        .route("/api/voices", get(instances::list_voices))
        .layer(TraceLayer::new_for_http())
}
