//! Realtime endpoint configuration and URL construction.
//!
//! The proxy can target three kinds of upstream:
//! - `azure_openai`: the endpoint is derived from the resource's https URL;
//!   the api-key travels as a query parameter alongside `api-version` and
//!   `deployment`.
//! - `openai`: the public realtime endpoint; the key travels as a bearer
//!   header together with the `OpenAI-Beta: realtime=v1` marker.
//! - `custom`: endpoint, headers, and query parameters taken verbatim.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{RealtimeError, RealtimeResult};

pub const DEFAULT_DEPLOYMENT: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_API_VERSION: &str = "2025-04-01-preview";
pub const OPENAI_REALTIME_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeProvider {
    AzureOpenai,
    Openai,
    Custom,
}

impl RealtimeProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeProvider::AzureOpenai => "azure_openai",
            RealtimeProvider::Openai => "openai",
            RealtimeProvider::Custom => "custom",
        }
    }
}

/// Configuration for the realtime proxy connection.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub provider: RealtimeProvider,
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    /// Extra headers, used by the custom provider.
    pub headers: Vec<(String, String)>,
    /// Extra query parameters, used by the custom provider.
    pub params: Vec<(String, String)>,
    /// Maximum events queued while disconnected.
    pub queue_capacity: usize,
    /// Initial connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum reconnect attempts after an abnormal close (None = unbounded).
    pub max_reconnect_attempts: Option<u32>,
}

impl RealtimeConfig {
    /// Azure OpenAI configuration from the resource's https endpoint.
    pub fn azure_openai(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            provider: RealtimeProvider::AzureOpenai,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
            headers: Vec::new(),
            params: Vec::new(),
            queue_capacity: 256,
            connect_timeout_secs: 30,
            max_reconnect_attempts: Some(8),
        }
    }

    /// OpenAI configuration against the public realtime endpoint.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider: RealtimeProvider::Openai,
            endpoint: OPENAI_REALTIME_ENDPOINT.to_string(),
            api_key: api_key.into(),
            deployment: String::new(),
            api_version: String::new(),
            headers: Vec::new(),
            params: Vec::new(),
            queue_capacity: 256,
            connect_timeout_secs: 30,
            max_reconnect_attempts: Some(8),
        }
    }

    /// Custom endpoint with explicit headers and query parameters.
    pub fn custom(
        endpoint: impl Into<String>,
        headers: Vec<(String, String)>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            provider: RealtimeProvider::Custom,
            endpoint: endpoint.into(),
            api_key: String::new(),
            deployment: String::new(),
            api_version: String::new(),
            headers,
            params,
            queue_capacity: 256,
            connect_timeout_secs: 30,
            max_reconnect_attempts: Some(8),
        }
    }

    /// Build a configuration from the `azure` section of an instance config.
    ///
    /// The section shape mirrors the instance YAML:
    /// ```yaml
    /// provider: azure_openai   # optional, defaults to azure_openai
    /// openai:
    ///   endpoint: "https://res.openai.azure.com"
    ///   api_key: "..."
    ///   deployment: "gpt-4o-realtime-preview"
    ///   api_version: "2025-04-01-preview"
    /// custom:
    ///   endpoint: "wss://example.com/realtime"
    ///   headers: {X-Token: "..."}
    ///   params: {model: "..."}
    /// ```
    pub fn from_value(azure: &Value) -> RealtimeResult<Self> {
        let provider = azure
            .get("provider")
            .and_then(|v| v.as_str())
            .unwrap_or("azure_openai");

        match provider {
            "azure_openai" => {
                let openai = azure.get("openai").ok_or_else(|| {
                    RealtimeError::InvalidConfiguration(
                        "azure.openai section is required for the azure_openai provider"
                            .to_string(),
                    )
                })?;
                let endpoint = openai
                    .get("endpoint")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        RealtimeError::InvalidConfiguration(
                            "azure.openai.endpoint is required".to_string(),
                        )
                    })?;
                let api_key = openai
                    .get("api_key")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let deployment = openai
                    .get("deployment")
                    .and_then(|v| v.as_str())
                    .unwrap_or(DEFAULT_DEPLOYMENT);
                let api_version = openai
                    .get("api_version")
                    .and_then(|v| v.as_str())
                    .unwrap_or(DEFAULT_API_VERSION);
                Ok(Self::azure_openai(endpoint, api_key, deployment, api_version))
            }
            "openai" => {
                let openai = azure.get("openai").ok_or_else(|| {
                    RealtimeError::InvalidConfiguration(
                        "azure.openai section is required for the openai provider".to_string(),
                    )
                })?;
                let api_key = openai
                    .get("api_key")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let mut config = Self::openai(api_key);
                if let Some(endpoint) = openai.get("endpoint").and_then(|v| v.as_str()) {
                    config.endpoint = endpoint.to_string();
                }
                Ok(config)
            }
            "custom" => {
                let custom = azure.get("custom").ok_or_else(|| {
                    RealtimeError::InvalidConfiguration(
                        "azure.custom section is required for the custom provider".to_string(),
                    )
                })?;
                let endpoint = custom
                    .get("endpoint")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        RealtimeError::InvalidConfiguration(
                            "azure.custom.endpoint is required".to_string(),
                        )
                    })?;
                let headers = string_pairs(custom.get("headers"));
                let params = string_pairs(custom.get("params"));
                Ok(Self::custom(endpoint, headers, params))
            }
            other => Err(RealtimeError::InvalidConfiguration(format!(
                "Unsupported realtime provider: {other}"
            ))),
        }
    }

    /// Build the WebSocket URL for this configuration.
    pub fn build_url(&self) -> RealtimeResult<String> {
        match self.provider {
            RealtimeProvider::AzureOpenai => {
                if self.endpoint.is_empty() {
                    return Err(RealtimeError::InvalidConfiguration(
                        "Azure OpenAI endpoint is empty".to_string(),
                    ));
                }
                let base = self
                    .endpoint
                    .replacen("https://", "wss://", 1)
                    .replacen("http://", "ws://", 1);
                let base = base.trim_end_matches('/');
                Ok(format!(
                    "{base}/openai/realtime?api-version={}&deployment={}&api-key={}",
                    urlencoding::encode(&self.api_version),
                    urlencoding::encode(&self.deployment),
                    urlencoding::encode(&self.api_key),
                ))
            }
            RealtimeProvider::Openai => {
                let mut url = self.endpoint.clone();
                append_params(&mut url, &self.params);
                Ok(url)
            }
            RealtimeProvider::Custom => {
                if self.endpoint.is_empty() {
                    return Err(RealtimeError::InvalidConfiguration(
                        "Custom realtime endpoint is empty".to_string(),
                    ));
                }
                let mut url = self.endpoint.clone();
                append_params(&mut url, &self.params);
                Ok(url)
            }
        }
    }

    /// Headers for the WebSocket handshake.
    ///
    /// Azure OpenAI authenticates through the URL; OpenAI uses a bearer token
    /// plus the realtime beta marker; custom endpoints supply their own.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        match self.provider {
            RealtimeProvider::AzureOpenai => Vec::new(),
            RealtimeProvider::Openai => vec![
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                ),
                ("OpenAI-Beta".to_string(), "realtime=v1".to_string()),
            ],
            RealtimeProvider::Custom => self.headers.clone(),
        }
    }

    /// Endpoint without credentials, safe for status output and logs.
    pub fn display_endpoint(&self) -> String {
        match self.provider {
            RealtimeProvider::AzureOpenai => {
                let base = self
                    .endpoint
                    .replacen("https://", "wss://", 1)
                    .replacen("http://", "ws://", 1);
                format!("{}/openai/realtime", base.trim_end_matches('/'))
            }
            _ => self.endpoint.clone(),
        }
    }
}

fn append_params(url: &mut String, params: &[(String, String)]) {
    for (i, (key, value)) in params.iter().enumerate() {
        url.push(if i == 0 && !url.contains('?') { '?' } else { '&' });
        url.push_str(&urlencoding::encode(key));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
}

fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(|v| v.as_mapping())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| {
                    Some((k.as_str()?.to_string(), v.as_str()?.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_openai_url() {
        let config = RealtimeConfig::azure_openai(
            "https://my-res.openai.azure.com/",
            "secret-key",
            "gpt-4o-realtime-preview",
            "2025-04-01-preview",
        );

        let url = config.build_url().unwrap();
        assert_eq!(
            url,
            "wss://my-res.openai.azure.com/openai/realtime\
             ?api-version=2025-04-01-preview&deployment=gpt-4o-realtime-preview&api-key=secret-key"
        );
    }

    #[test]
    fn test_azure_openai_headers_empty() {
        let config = RealtimeConfig::azure_openai("https://x", "k", "d", "v");
        assert!(config.request_headers().is_empty());
    }

    #[test]
    fn test_openai_url_and_headers() {
        let config = RealtimeConfig::openai("sk-test");

        assert_eq!(config.build_url().unwrap(), OPENAI_REALTIME_ENDPOINT);

        let headers = config.request_headers();
        assert!(
            headers
                .iter()
                .any(|(k, v)| k == "Authorization" && v == "Bearer sk-test")
        );
        assert!(
            headers
                .iter()
                .any(|(k, v)| k == "OpenAI-Beta" && v == "realtime=v1")
        );
    }

    #[test]
    fn test_custom_url_with_params() {
        let config = RealtimeConfig::custom(
            "wss://example.com/realtime",
            vec![("X-Token".to_string(), "abc".to_string())],
            vec![("model".to_string(), "fast one".to_string())],
        );

        let url = config.build_url().unwrap();
        assert_eq!(url, "wss://example.com/realtime?model=fast%20one");
        assert_eq!(
            config.request_headers(),
            vec![("X-Token".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn test_display_endpoint_has_no_credentials() {
        let config = RealtimeConfig::azure_openai(
            "https://my-res.openai.azure.com",
            "secret-key",
            "d",
            "v",
        );

        let display = config.display_endpoint();
        assert_eq!(display, "wss://my-res.openai.azure.com/openai/realtime");
        assert!(!display.contains("secret-key"));
    }

    #[test]
    fn test_from_value_azure_defaults() {
        let azure: Value = serde_yaml::from_str(
            r#"
openai:
  endpoint: "https://res.openai.azure.com"
  api_key: "key"
"#,
        )
        .unwrap();

        let config = RealtimeConfig::from_value(&azure).unwrap();
        assert_eq!(config.provider, RealtimeProvider::AzureOpenai);
        assert_eq!(config.deployment, DEFAULT_DEPLOYMENT);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn test_from_value_custom() {
        let azure: Value = serde_yaml::from_str(
            r#"
provider: custom
custom:
  endpoint: "wss://example.com/rt"
  headers:
    X-Token: abc
  params:
    model: demo
"#,
        )
        .unwrap();

        let config = RealtimeConfig::from_value(&azure).unwrap();
        assert_eq!(config.provider, RealtimeProvider::Custom);
        assert_eq!(config.endpoint, "wss://example.com/rt");
        assert_eq!(
            config.headers,
            vec![("X-Token".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn test_from_value_missing_endpoint() {
        let azure: Value = serde_yaml::from_str("openai: {api_key: k}").unwrap();
        let result = RealtimeConfig::from_value(&azure);
        assert!(matches!(
            result,
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_from_value_unknown_provider() {
        let azure: Value = serde_yaml::from_str("provider: telepathy").unwrap();
        let result = RealtimeConfig::from_value(&azure);
        assert!(matches!(
            result,
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }
}
