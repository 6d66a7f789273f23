use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// This structure represents the full server configuration that can be loaded
/// from a YAML file. All fields are optional to allow partial configuration;
/// environment variables fill in anything left unset.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   cors_origins:
///     - "https://app.example.com"
///
/// azure_openai:
///   endpoint: "https://my-resource.openai.azure.com"
///   api_key: "your-api-key"
///   deployment: "gpt-4o-realtime-preview"
///   api_version: "2025-04-01-preview"
///
/// azure_speech:
///   key: "your-speech-key"
///   region: "westus2"
///
/// azure_search:
///   endpoint: "https://my-search.search.windows.net"
///   api_key: "your-search-key"
///   index: "knowledge-base"
///
/// paths:
///   instances_root: "instances"
///   templates_root: "templates"
///   personas_root: "personas/templates"
///   data_root: "data"
///
/// limits:
///   max_instances: 10
///
/// auth:
///   required: true
///   api_secret: "your-api-secret"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub azure_openai: Option<AzureOpenAiYaml>,
    pub azure_speech: Option<AzureSpeechYaml>,
    pub azure_search: Option<AzureSearchYaml>,
    pub paths: Option<PathsYaml>,
    pub limits: Option<LimitsYaml>,
    pub auth: Option<AuthYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_origins: Option<Vec<String>>,
}

/// Azure OpenAI Realtime API configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AzureOpenAiYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
}

/// Azure Speech Services configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AzureSpeechYaml {
    pub key: Option<String>,
    pub region: Option<String>,
}

/// Azure Cognitive Search configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AzureSearchYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub index: Option<String>,
}

/// Filesystem layout configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PathsYaml {
    pub instances_root: Option<PathBuf>,
    pub templates_root: Option<PathBuf>,
    pub personas_root: Option<PathBuf>,
    pub data_root: Option<PathBuf>,
}

/// Resource limit configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LimitsYaml {
    pub max_instances: Option<usize>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    pub api_secret: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
