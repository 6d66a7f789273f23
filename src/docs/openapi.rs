//! OpenAPI specification and documentation
//!
//! This module provides OpenAPI documentation for the REST API.
//! It is only compiled when the `openapi` feature is enabled.

use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::handlers::api::{HealthResponse, InstanceCounts};
use crate::handlers::instances::{CreateInstanceRequest, InstanceActionResponse};
use crate::handlers::sessions::StartSessionRequest;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Avatar Factory API",
        version = "0.1.0",
        description = "Multi-tenant avatar instance server: instance lifecycle, \
                       session control, realtime passthrough, and speech synthesis"
    ),
    servers(
        (url = "http://localhost:3001", description = "Local development")
    ),
    paths(
        crate::handlers::api::health_check,
        crate::handlers::api::metrics,
        crate::handlers::instances::list_instances,
        crate::handlers::instances::create_instance,
        crate::handlers::instances::start_instance,
        crate::handlers::instances::stop_instance,
        crate::handlers::instances::instance_status,
        crate::handlers::instances::instance_config,
        crate::handlers::instances::validate_instance,
        crate::handlers::instances::delete_instance,
        crate::handlers::instances::export_instance,
        crate::handlers::instances::list_templates,
        crate::handlers::instances::list_voices,
        crate::handlers::sessions::start_session,
        crate::handlers::sessions::stop_session,
        crate::handlers::sessions::post_message,
    ),
    components(schemas(
        HealthResponse,
        InstanceCounts,
        CreateInstanceRequest,
        InstanceActionResponse,
        StartSessionRequest,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "metrics", description = "Aggregate metrics"),
        (name = "instances", description = "Instance lifecycle management"),
        (name = "sessions", description = "Session control and messaging"),
        (name = "templates", description = "Instance templates"),
        (name = "voices", description = "Speech synthesis voices")
    )
)]
pub struct ApiDoc;

/// Create OpenAPI documentation routes
///
/// Routes:
/// - `GET /docs/openapi.json` - OpenAPI spec as JSON
/// - `GET /docs/openapi.yaml` - OpenAPI spec as YAML
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/docs/openapi.json", get(openapi_json_handler))
        .route("/docs/openapi.yaml", get(openapi_yaml_handler))
}

async fn openapi_json_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn openapi_yaml_handler() -> ([(axum::http::header::HeaderName, &'static str); 1], String) {
    let yaml = spec_yaml().unwrap_or_else(|e| format!("Error generating YAML: {e}"));
    (
        [(axum::http::header::CONTENT_TYPE, "application/yaml")],
        yaml,
    )
}

/// The OpenAPI spec serialized as YAML
pub fn spec_yaml() -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&ApiDoc::openapi())
}

/// The OpenAPI spec serialized as JSON
pub fn spec_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_generates() {
        let json = spec_json().unwrap();
        assert!(json.contains("/api/instances"));
        assert!(json.contains("Avatar Factory API"));

        let yaml = spec_yaml().unwrap();
        assert!(yaml.contains("/api/health"));
    }
}
