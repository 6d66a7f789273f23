use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
///
/// The `/ws` endpoint is intentionally unauthenticated: browser WebSocket
/// clients cannot set bearer headers on the upgrade request, and the REST
/// surface (which can mutate instances on disk) is the one protected by
/// `AUTH_REQUIRED`. Deployments that need WebSocket auth should front the
/// endpoint with a reverse proxy.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
}
