use std::env;
use std::path::PathBuf;

use axum::{Router, http::HeaderValue, middleware};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use anyhow::anyhow;

use avatar_factory::{
    ServerConfig, middleware::auth::auth_middleware, routes, state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Handle CLI commands
    let mut args = env::args();
    let _ = args.next();
    if let Some(command) = args.next() {
        match command.as_str() {
            "create" => {
                let name = args
                    .next()
                    .ok_or_else(|| anyhow!("Usage: create <name> [--template <template>]"))?;

                let mut template = "assistant".to_string();
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "-t" | "--template" => {
                            template = args
                                .next()
                                .ok_or_else(|| anyhow!("--template requires a value"))?;
                        }
                        other => {
                            anyhow::bail!("Unknown option '{other}'. Use --template <name>");
                        }
                    }
                }

                let config = load_config()?;
                let app_state = AppState::new(config).await;
                app_state
                    .manager
                    .factory()
                    .create_from_template(&name, &template, None)
                    .map_err(|e| anyhow!("Failed to create instance: {e}"))?;
                println!("Instance '{name}' created from template '{template}'");
                return Ok(());
            }
            #[cfg(feature = "openapi")]
            "openapi" => {
                let mut format = "yaml".to_string();
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "-f" | "--format" => {
                            format = args
                                .next()
                                .ok_or_else(|| anyhow!("--format requires a value (yaml or json)"))?;
                        }
                        other => {
                            anyhow::bail!("Unknown option '{other}'. Use --format (yaml|json)");
                        }
                    }
                }

                let spec = match format.as_str() {
                    "yaml" => avatar_factory::docs::openapi::spec_yaml()
                        .map_err(|e| anyhow!("Failed to generate OpenAPI YAML: {e}"))?,
                    "json" => avatar_factory::docs::openapi::spec_json()
                        .map_err(|e| anyhow!("Failed to generate OpenAPI JSON: {e}"))?,
                    other => anyhow::bail!("Invalid format '{other}'. Must be 'yaml' or 'json'"),
                };
                println!("{spec}");
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown command '{other}'. Supported commands: create");
            }
        }
    }

    // Load configuration
    let config = load_config()?;
    let address = config.address();
    println!("Starting server on {address}");

    // Create application state
    let app_state = AppState::new(config).await;

    // Load a default instance when one is configured
    if let Ok(default_instance) = env::var("DEFAULT_INSTANCE") {
        match app_state.manager.start_instance(&default_instance).await {
            Ok(()) => tracing::info!("Default instance loaded: {default_instance}"),
            Err(e) => tracing::error!("Failed to load default instance {default_instance}: {e}"),
        }
    }

    // Create protected API routes with authentication middleware
    let protected_routes = routes::api::create_api_router().layer(middleware::from_fn_with_state(
        app_state.clone(),
        auth_middleware,
    ));

    // Create WebSocket routes (unauthenticated, see routes::ws)
    let ws_routes = routes::ws::create_ws_router();

    // Public health check route (no auth)
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(avatar_factory::handlers::api::health_check),
    );

    // Combine all routes: public + protected + websocket
    let app = public_routes
        .merge(protected_routes)
        .merge(ws_routes)
        .layer(cors_layer(&app_state.config.cors_origins))
        .with_state(app_state.clone());

    #[cfg(feature = "openapi")]
    let app = app.merge(avatar_factory::docs::openapi::router());

    // Create listener
    let listener = TcpListener::bind(&address).await?;

    println!("Server listening on {address}");

    // Start server with graceful shutdown: stop instances and persist state
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.manager.shutdown_all().await;
    if let Err(e) = app_state.manager.save_state().await {
        tracing::error!("Failed to save instance manager state: {e}");
    }

    Ok(())
}

fn load_config() -> anyhow::Result<ServerConfig> {
    let config = match env::var("CONFIG_PATH") {
        Ok(path) => ServerConfig::from_file(&PathBuf::from(path))
            .map_err(|e| anyhow!(e.to_string()))?,
        Err(_) => ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?,
    };
    Ok(config)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
