//! Configuration module for the avatar factory server
//!
//! This module handles server configuration from various sources: YAML files and
//! environment variables. When a YAML file is explicitly provided its values win
//! over the environment; environment variables fill in the rest.
//! The configuration is split into logical submodules for maintainability.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use avatar_factory::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use merge::merge_config;
pub use yaml::YamlConfig;

/// Server configuration
///
/// Contains all configuration needed to run the avatar factory server:
/// - Server settings (host, port, CORS)
/// - Azure OpenAI Realtime API defaults (endpoint, key, deployment)
/// - Azure Speech Services defaults (key, region)
/// - Azure Cognitive Search defaults (RAG backend)
/// - Filesystem layout (instances, templates, personas, data)
/// - Instance limits and authentication settings
///
/// The Azure sections are server-wide defaults: instance configurations can
/// carry their own `azure` stanza, and instance values always take precedence.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    // Azure OpenAI Realtime API
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_deployment: String,
    pub azure_openai_api_version: String,

    // Azure Speech Services
    pub azure_speech_key: Option<String>,
    pub azure_speech_region: String,

    // Azure Cognitive Search
    pub azure_search_endpoint: Option<String>,
    pub azure_search_api_key: Option<String>,
    pub azure_search_index: Option<String>,

    // Filesystem layout
    pub instances_root: PathBuf,
    pub templates_root: PathBuf,
    pub personas_root: PathBuf,
    pub data_root: PathBuf,

    // Limits
    pub max_instances: usize,

    // Authentication configuration
    pub auth_api_secret: Option<String>,
    pub auth_required: bool,
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, or if
    /// the merged configuration fails validation.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        merge::merge_config(Some(yaml_config))
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if API secret authentication is configured
    pub fn has_api_secret_auth(&self) -> bool {
        self.auth_api_secret.is_some()
    }

    /// Check if a server-wide Azure OpenAI default is configured
    pub fn has_azure_openai(&self) -> bool {
        self.azure_openai_endpoint.is_some() && self.azure_openai_api_key.is_some()
    }

    /// Check if a server-wide Azure Speech default is configured
    pub fn has_azure_speech(&self) -> bool {
        self.azure_speech_key.is_some()
    }

    /// Server-wide Azure defaults as a config overlay
    ///
    /// Produces an `azure` section suitable for deep-merging *under* an
    /// instance configuration: any value the instance config sets wins, and
    /// sections with no configured server default are omitted entirely.
    pub fn azure_defaults(&self) -> Option<serde_yaml::Value> {
        let mut azure = serde_yaml::Mapping::new();

        if self.has_azure_openai() {
            let mut openai = serde_yaml::Mapping::new();
            openai.insert(
                "endpoint".into(),
                self.azure_openai_endpoint.clone().unwrap().into(),
            );
            openai.insert(
                "api_key".into(),
                self.azure_openai_api_key.clone().unwrap().into(),
            );
            openai.insert(
                "deployment".into(),
                self.azure_openai_deployment.clone().into(),
            );
            openai.insert(
                "api_version".into(),
                self.azure_openai_api_version.clone().into(),
            );
            azure.insert("openai".into(), serde_yaml::Value::Mapping(openai));
        }

        if let Some(key) = &self.azure_speech_key {
            let mut speech = serde_yaml::Mapping::new();
            speech.insert("key".into(), key.clone().into());
            speech.insert("region".into(), self.azure_speech_region.clone().into());
            azure.insert("speech".into(), serde_yaml::Value::Mapping(speech));
        }

        if let (Some(endpoint), Some(api_key), Some(index)) = (
            &self.azure_search_endpoint,
            &self.azure_search_api_key,
            &self.azure_search_index,
        ) {
            let mut search = serde_yaml::Mapping::new();
            search.insert("endpoint".into(), endpoint.clone().into());
            search.insert("api_key".into(), api_key.clone().into());
            search.insert("index".into(), index.clone().into());
            azure.insert("cognitive_search".into(), serde_yaml::Value::Mapping(search));
        }

        if azure.is_empty() {
            None
        } else {
            let mut root = serde_yaml::Mapping::new();
            root.insert("azure".into(), serde_yaml::Value::Mapping(azure));
            Some(serde_yaml::Value::Mapping(root))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "localhost".to_string(),
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
            instances_root: PathBuf::from("instances"),
            templates_root: PathBuf::from("templates"),
            personas_root: PathBuf::from("personas/templates"),
            data_root: PathBuf::from("data"),
            max_instances: 10,
            auth_api_secret: None,
            auth_required: false,
        }
    }

    #[test]
    fn test_address() {
        let config = test_config();
        assert_eq!(config.address(), "localhost:3001");
    }

    #[test]
    fn test_has_api_secret_auth() {
        let mut config = test_config();
        assert!(!config.has_api_secret_auth());

        config.auth_api_secret = Some("secret".to_string());
        assert!(config.has_api_secret_auth());
    }

    #[test]
    fn test_azure_defaults_empty() {
        let config = test_config();
        assert!(config.azure_defaults().is_none());
    }

    #[test]
    fn test_azure_defaults_openai_only() {
        let mut config = test_config();
        config.azure_openai_endpoint = Some("https://res.openai.azure.com".to_string());
        config.azure_openai_api_key = Some("key".to_string());

        let overlay = config.azure_defaults().expect("overlay present");
        let endpoint = overlay
            .get("azure")
            .and_then(|a| a.get("openai"))
            .and_then(|o| o.get("endpoint"))
            .and_then(|v| v.as_str());
        assert_eq!(endpoint, Some("https://res.openai.azure.com"));
        assert!(overlay.get("azure").and_then(|a| a.get("speech")).is_none());
    }

    #[test]
    fn test_azure_defaults_speech() {
        let mut config = test_config();
        config.azure_speech_key = Some("sk".to_string());
        config.azure_speech_region = "eastus".to_string();

        let overlay = config.azure_defaults().expect("overlay present");
        let region = overlay
            .get("azure")
            .and_then(|a| a.get("speech"))
            .and_then(|s| s.get("region"))
            .and_then(|v| v.as_str());
        assert_eq!(region, Some("eastus"));
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_wins_over_env() {
        unsafe {
            std::env::remove_var("HOST");
            std::env::set_var("PORT", "9999");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  host: "127.0.0.1"
  port: 8080
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);

        unsafe {
            std::env::remove_var("PORT");
        }
    }
}
