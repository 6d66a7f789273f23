//! Instance management REST handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::core::instance_config::InstanceConfig;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::masking::mask_sensitive;

fn default_template_name() -> String {
    "assistant".to_string()
}

/// Request body for instance creation
#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateInstanceRequest {
    pub name: String,
    #[serde(default = "default_template_name")]
    pub template: String,
    /// Configuration overrides deep-merged into the template
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Response body for lifecycle operations
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InstanceActionResponse {
    pub success: bool,
    pub instance: String,
    pub status: String,
}

/// List all instances on disk and the ones currently running
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/instances",
    tag = "instances",
    responses((status = 200, description = "Instance listing"))
))]
pub async fn list_instances(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "instances": state.manager.factory().list_instances(),
        "running": state.manager.list_running_instances().await,
    }))
}

/// Create a new instance from a template
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances",
    tag = "instances",
    request_body = CreateInstanceRequest,
    responses(
        (status = 200, description = "Instance created"),
        (status = 400, description = "Invalid name or template")
    )
))]
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateInstanceRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if request.name.is_empty()
        || !request
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::BadRequest(format!(
            "Invalid instance name: '{}'",
            request.name
        )));
    }

    let overrides = match request.config {
        Some(config) => Some(
            serde_yaml::to_value(config)
                .map_err(|e| AppError::BadRequest(format!("Invalid config overrides: {e}")))?,
        ),
        None => None,
    };

    state
        .manager
        .factory()
        .create_from_template(&request.name, &request.template, overrides)?;

    Ok(Json(json!({
        "success": true,
        "instance": request.name,
        "message": format!("Instance {} created successfully", request.name),
    })))
}

/// Start an instance
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances/{name}/start",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses((status = 200, description = "Instance started"))
))]
pub async fn start_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<InstanceActionResponse>> {
    state.manager.start_instance(&name).await?;
    Ok(Json(InstanceActionResponse {
        success: true,
        instance: name,
        status: "running".to_string(),
    }))
}

/// Stop an instance
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances/{name}/stop",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses((status = 200, description = "Instance stopped"))
))]
pub async fn stop_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<InstanceActionResponse>> {
    state.manager.stop_instance(&name).await?;
    Ok(Json(InstanceActionResponse {
        success: true,
        instance: name,
        status: "stopped".to_string(),
    }))
}

/// Instance status: running, stopped, or not found
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/instances/{name}/status",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses((status = 200, description = "Instance status"))
))]
pub async fn instance_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<serde_json::Value> {
    Json(state.manager.instance_status(&name).await)
}

/// Instance configuration with credentials masked
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/instances/{name}/config",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses(
        (status = 200, description = "Masked instance configuration"),
        (status = 404, description = "Instance not found")
    )
))]
pub async fn instance_config(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let config_path = state.manager.factory().paths().config_path(&name);
    let config = InstanceConfig::from_file(&config_path)
        .map_err(|e| AppError::NotFound(e.to_string()))?;
    let json_config = config
        .to_json_value()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(mask_sensitive(&json_config)))
}

/// Validate an instance's configuration and layout
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/instances/{name}/validate",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses((status = 200, description = "Validation result"))
))]
pub async fn validate_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<serde_json::Value> {
    let errors = state.manager.factory().validate_instance(&name);
    Json(json!({
        "valid": errors.is_empty(),
        "errors": errors,
    }))
}

/// Delete an instance (stopping it first when running)
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/instances/{name}",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses((status = 200, description = "Instance deleted"))
))]
pub async fn delete_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if state.manager.get_instance(&name).await.is_some() {
        state.manager.stop_instance(&name).await?;
    }

    let deleted = state.manager.factory().delete_instance(&name)?;
    Ok(Json(json!({
        "success": deleted,
        "instance": name,
    })))
}

/// Export an instance as a zip package
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/instances/{name}/export",
    tag = "instances",
    params(("name" = String, Path, description = "Instance name")),
    responses(
        (status = 200, description = "Instance exported"),
        (status = 404, description = "Instance not found")
    )
))]
pub async fn export_instance(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let package_path = state.manager.factory().export_instance(&name, None)?;
    Ok(Json(json!({
        "success": true,
        "package_path": package_path.display().to_string(),
    })))
}

/// Query parameters for the voices listing
#[derive(Debug, Deserialize)]
pub struct VoicesQuery {
    pub language: Option<String>,
}

/// List known synthesis voices, optionally filtered by language
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/voices",
    tag = "voices",
    responses((status = 200, description = "Voice listing"))
))]
pub async fn list_voices(Query(query): Query<VoicesQuery>) -> Json<serde_json::Value> {
    let voices =
        crate::core::speech::SpeechHandler::available_voices(query.language.as_deref());
    Json(json!({ "voices": voices }))
}

/// List available templates
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/templates",
    tag = "templates",
    responses((status = 200, description = "Template listing"))
))]
pub async fn list_templates(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "templates": state.manager.factory().list_templates(),
    }))
}
