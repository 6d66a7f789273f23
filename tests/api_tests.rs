use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
};
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;
use tower::util::ServiceExt;

use avatar_factory::{
    ServerConfig, middleware::auth::auth_middleware, routes, state::AppState,
};

fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 3001,
        cors_origins: vec!["*".to_string()],
        azure_openai_endpoint: None,
        azure_openai_api_key: None,
        azure_openai_deployment: "gpt-4o-realtime-preview".to_string(),
        azure_openai_api_version: "2025-04-01-preview".to_string(),
        azure_speech_key: None,
        azure_speech_region: "westus2".to_string(),
        azure_search_endpoint: None,
        azure_search_api_key: None,
        azure_search_index: None,
        instances_root: root.join("instances"),
        templates_root: root.join("templates"),
        personas_root: root.join("personas"),
        data_root: root.join("data"),
        max_instances: 10,
        auth_api_secret: None,
        auth_required: false,
    }
}

fn write_offline_template(root: &Path) {
    // Template without azure sections so instances run without credentials
    std::fs::create_dir_all(root.join("templates")).unwrap();
    std::fs::write(
        root.join("templates/offline.yaml"),
        "instance:\n  environment: test\nplugins:\n  - rag_plugin\n",
    )
    .unwrap();
}

async fn test_app(root: &Path) -> axum::Router {
    let app_state = AppState::new(test_config(root)).await;
    routes::api::create_api_router().with_state(app_state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(temp_dir.path()).await;

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["instances"]["total"], 0);
    assert_eq!(json["instances"]["running"], 0);
}

#[tokio::test]
async fn test_list_instances_empty() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(temp_dir.path()).await;

    let response = app.oneshot(get("/api/instances")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["instances"], json!([]));
    assert_eq!(json["running"], json!([]));
}

#[tokio::test]
async fn test_instance_crud_flow() {
    let temp_dir = TempDir::new().unwrap();
    write_offline_template(temp_dir.path());
    let app = test_app(temp_dir.path()).await;

    // Create
    let response = app
        .clone()
        .oneshot(post(
            "/api/instances",
            json!({"name": "demo", "template": "offline"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["instance"], "demo");

    // Listed
    let response = app.clone().oneshot(get("/api/instances")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["instances"], json!(["demo"]));

    // Status: stopped on disk
    let response = app
        .clone()
        .oneshot(get("/api/instances/demo/status"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "stopped");

    // Start
    let response = app
        .clone()
        .oneshot(post("/api/instances/demo/start", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "running");

    // Validate
    let response = app
        .clone()
        .oneshot(get("/api/instances/demo/validate"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["valid"], true);

    // Stop
    let response = app
        .clone()
        .oneshot(post("/api/instances/demo/stop", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Delete
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/instances/demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);

    let response = app.oneshot(get("/api/instances")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["instances"], json!([]));
}

#[tokio::test]
async fn test_create_instance_invalid_name() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(temp_dir.path()).await;

    let response = app
        .oneshot(post(
            "/api/instances",
            json!({"name": "../escape", "template": "offline"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_unknown_instance() {
    let temp_dir = TempDir::new().unwrap();
    let app = test_app(temp_dir.path()).await;

    let response = app
        .oneshot(post("/api/instances/ghost/start", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_flow_over_api() {
    let temp_dir = TempDir::new().unwrap();
    write_offline_template(temp_dir.path());
    std::fs::create_dir_all(temp_dir.path().join("instances")).unwrap();
    let app = test_app(temp_dir.path()).await;

    app.clone()
        .oneshot(post(
            "/api/instances",
            json!({"name": "demo", "template": "offline"}),
        ))
        .await
        .unwrap();

    // Start session (auto-starts the instance)
    let response = app
        .clone()
        .oneshot(post(
            "/api/instances/demo/session/start",
            json!({"session_id": "s-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_id"], "s-1");
    assert_eq!(json["status"], "active");

    // Second start conflicts
    let response = app
        .clone()
        .oneshot(post("/api/instances/demo/session/start", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Message
    let response = app
        .clone()
        .oneshot(post(
            "/api/instances/demo/message",
            json!({"type": "text", "content": "hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.get("content").is_some());

    // Stop session
    let response = app
        .clone()
        .oneshot(post("/api/instances/demo/session/stop", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "stopped");
    assert_eq!(json["session_id"], "s-1");

    // Message without a session conflicts
    let response = app
        .oneshot(post(
            "/api/instances/demo/message",
            json!({"type": "text", "content": "anyone there?"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_instance_config_is_masked() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("templates")).unwrap();
    std::fs::write(
        temp_dir.path().join("templates/speechy.yaml"),
        "azure:\n  speech:\n    key: \"super-secret-key\"\n    region: westus2\n",
    )
    .unwrap();
    let app = test_app(temp_dir.path()).await;

    app.clone()
        .oneshot(post(
            "/api/instances",
            json!({"name": "demo", "template": "speechy"}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get("/api/instances/demo/config"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["azure"]["speech"]["key"], "***MASKED***");
    assert_eq!(json["azure"]["speech"]["region"], "westus2");
}

#[tokio::test]
async fn test_templates_and_voices_endpoints() {
    let temp_dir = TempDir::new().unwrap();
    write_offline_template(temp_dir.path());
    let app = test_app(temp_dir.path()).await;

    let response = app.clone().oneshot(get("/api/templates")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["templates"], json!(["offline"]));

    let response = app
        .oneshot(get("/api/voices?language=es-AR"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(
        json["voices"],
        json!(["es-AR-ElenaNeural", "es-AR-TomasNeural"])
    );
}

#[tokio::test]
async fn test_auth_required_rejects_missing_token() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.auth_required = true;
    config.auth_api_secret = Some("test-secret".to_string());

    let app_state = AppState::new(config).await;
    let app = routes::api::create_api_router()
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ))
        .with_state(app_state);

    // No header
    let response = app.clone().oneshot(get("/api/instances")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/instances")
                .header("authorization", "Bearer wrong-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Correct token
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/instances")
                .header("authorization", "Bearer test-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_export_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    write_offline_template(temp_dir.path());
    let app = test_app(temp_dir.path()).await;

    app.clone()
        .oneshot(post(
            "/api/instances",
            json!({"name": "demo", "template": "offline"}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post("/api/instances/demo/export", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    let package = json["package_path"].as_str().unwrap();
    assert!(std::path::Path::new(package).exists());
}
