use std::env;
use std::path::PathBuf;

use super::ServerConfig;
use super::utils::{parse_bool, parse_origins};
use super::validation::{validate_auth_required, validate_endpoint, validate_max_instances};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible defaults.
    /// Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Numeric environment variables are malformed
    /// - Azure endpoints are not http(s) URLs
    /// - Auth is required but no API secret is configured
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        // Server configuration
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| vec!["*".to_string()]);

        // Azure OpenAI Realtime API
        let azure_openai_endpoint = env::var("AZURE_OPENAI_ENDPOINT").ok();
        let azure_openai_api_key = env::var("AZURE_OPENAI_API_KEY").ok();
        let azure_openai_deployment = env::var("AZURE_OPENAI_DEPLOYMENT")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string());
        let azure_openai_api_version = env::var("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|_| "2025-04-01-preview".to_string());

        // Azure Speech Services
        let azure_speech_key = env::var("SPEECH_KEY").ok();
        let azure_speech_region =
            env::var("SPEECH_REGION").unwrap_or_else(|_| "westus2".to_string());

        // Azure Cognitive Search (RAG backend)
        let azure_search_endpoint = env::var("AZURE_SEARCH_ENDPOINT").ok();
        let azure_search_api_key = env::var("AZURE_SEARCH_API_KEY").ok();
        let azure_search_index = env::var("AZURE_SEARCH_INDEX").ok();

        // Filesystem layout
        let instances_root = env::var("INSTANCES_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("instances"));
        let templates_root = env::var("TEMPLATES_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("templates"));
        let personas_root = env::var("PERSONAS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("personas/templates"));
        let data_root = env::var("DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        // Limits
        let max_instances = env::var("MAX_INSTANCES")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .map_err(|e| format!("Invalid MAX_INSTANCES: {e}"))?;

        // Authentication configuration
        let auth_api_secret = env::var("AUTH_API_SECRET").ok();
        let auth_required = env::var("AUTH_REQUIRED")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);

        validate_endpoint("AZURE_OPENAI_ENDPOINT", &azure_openai_endpoint)?;
        validate_endpoint("AZURE_SEARCH_ENDPOINT", &azure_search_endpoint)?;
        validate_auth_required(auth_required, &auth_api_secret)?;
        validate_max_instances(max_instances)?;

        Ok(ServerConfig {
            host,
            port,
            cors_origins,
            azure_openai_endpoint,
            azure_openai_api_key,
            azure_openai_deployment,
            azure_openai_api_version,
            azure_speech_key,
            azure_speech_region,
            azure_search_endpoint,
            azure_search_api_key,
            azure_search_index,
            instances_root,
            templates_root,
            personas_root,
            data_root,
            max_instances,
            auth_api_secret,
            auth_required,
        })
    }
}
