use std::env;
use std::path::PathBuf;

use super::ServerConfig;
use super::utils::{parse_bool, parse_origins};
use super::validation::{validate_auth_required, validate_endpoint, validate_max_instances};
use super::yaml::YamlConfig;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// When a YAML file is explicitly supplied it is treated as the source of
/// truth; environment variables only fill in values the file leaves unset.
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration to use as overrides
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    // Server configuration
    let host = get_value!(
        "HOST",
        yaml.server.as_ref().and_then(|s| s.host.clone()),
        "0.0.0.0"
    );

    let port = if let Some(yaml_port) = yaml.server.as_ref().and_then(|s| s.port) {
        yaml_port
    } else if let Ok(port_str) = env::var("PORT") {
        port_str
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT environment variable: {e}"))?
    } else {
        3001
    };

    let cors_origins = yaml
        .server
        .as_ref()
        .and_then(|s| s.cors_origins.clone())
        .or_else(|| env::var("CORS_ORIGINS").ok().map(|v| parse_origins(&v)))
        .unwrap_or_else(|| vec!["*".to_string()]);

    // Azure OpenAI configuration
    let azure_openai_endpoint = get_optional!(
        "AZURE_OPENAI_ENDPOINT",
        yaml.azure_openai.as_ref().and_then(|a| a.endpoint.clone())
    );

    let azure_openai_api_key = get_optional!(
        "AZURE_OPENAI_API_KEY",
        yaml.azure_openai.as_ref().and_then(|a| a.api_key.clone())
    );

    let azure_openai_deployment = get_value!(
        "AZURE_OPENAI_DEPLOYMENT",
        yaml.azure_openai
            .as_ref()
            .and_then(|a| a.deployment.clone()),
        "gpt-4o-realtime-preview"
    );

    let azure_openai_api_version = get_value!(
        "AZURE_OPENAI_API_VERSION",
        yaml.azure_openai
            .as_ref()
            .and_then(|a| a.api_version.clone()),
        "2025-04-01-preview"
    );

    // Azure Speech configuration
    let azure_speech_key = get_optional!(
        "SPEECH_KEY",
        yaml.azure_speech.as_ref().and_then(|s| s.key.clone())
    );

    let azure_speech_region = get_value!(
        "SPEECH_REGION",
        yaml.azure_speech.as_ref().and_then(|s| s.region.clone()),
        "westus2"
    );

    // Azure Cognitive Search configuration
    let azure_search_endpoint = get_optional!(
        "AZURE_SEARCH_ENDPOINT",
        yaml.azure_search.as_ref().and_then(|s| s.endpoint.clone())
    );

    let azure_search_api_key = get_optional!(
        "AZURE_SEARCH_API_KEY",
        yaml.azure_search.as_ref().and_then(|s| s.api_key.clone())
    );

    let azure_search_index = get_optional!(
        "AZURE_SEARCH_INDEX",
        yaml.azure_search.as_ref().and_then(|s| s.index.clone())
    );

    // Filesystem layout
    let instances_root = yaml
        .paths
        .as_ref()
        .and_then(|p| p.instances_root.clone())
        .or_else(|| env::var("INSTANCES_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("instances"));

    let templates_root = yaml
        .paths
        .as_ref()
        .and_then(|p| p.templates_root.clone())
        .or_else(|| env::var("TEMPLATES_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("templates"));

    let personas_root = yaml
        .paths
        .as_ref()
        .and_then(|p| p.personas_root.clone())
        .or_else(|| env::var("PERSONAS_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("personas/templates"));

    let data_root = yaml
        .paths
        .as_ref()
        .and_then(|p| p.data_root.clone())
        .or_else(|| env::var("DATA_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));

    // Limits
    let max_instances = if let Some(limit) = yaml.limits.as_ref().and_then(|l| l.max_instances) {
        limit
    } else if let Ok(limit_str) = env::var("MAX_INSTANCES") {
        limit_str
            .parse::<usize>()
            .map_err(|e| format!("Invalid MAX_INSTANCES environment variable: {e}"))?
    } else {
        10
    };

    // Authentication configuration
    let auth_api_secret = get_optional!(
        "AUTH_API_SECRET",
        yaml.auth.as_ref().and_then(|a| a.api_secret.clone())
    );

    let auth_required = yaml
        .auth
        .as_ref()
        .and_then(|a| a.required)
        .or_else(|| env::var("AUTH_REQUIRED").ok().and_then(|s| parse_bool(&s)))
        .unwrap_or(false);

    validate_endpoint("azure_openai.endpoint", &azure_openai_endpoint)?;
    validate_endpoint("azure_search.endpoint", &azure_search_endpoint)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("HOST");
            env::remove_var("PORT");
            env::remove_var("CORS_ORIGINS");
            env::remove_var("AZURE_OPENAI_ENDPOINT");
            env::remove_var("AZURE_OPENAI_API_KEY");
            env::remove_var("SPEECH_KEY");
            env::remove_var("SPEECH_REGION");
            env::remove_var("MAX_INSTANCES");
            env::remove_var("AUTH_API_SECRET");
            env::remove_var("AUTH_REQUIRED");
            env::remove_var("INSTANCES_ROOT");
        }
    }

    #[test]
    #[serial]
    fn test_merge_yaml_only() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(super::super::yaml::ServerYaml {
                host: Some("127.0.0.1".to_string()),
                port: Some(8080),
                cors_origins: None,
            }),
            limits: Some(super::super::yaml::LimitsYaml {
                max_instances: Some(4),
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_instances, 4);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_yaml_overrides_env() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(super::super::yaml::ServerYaml {
                host: Some("127.0.0.1".to_string()),
                port: Some(8080),
                cors_origins: None,
            }),
            ..Default::default()
        };

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("PORT", "9000");
        }

        let config = merge_config(Some(yaml)).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_env_fills_yaml_gaps() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            server: Some(super::super::yaml::ServerYaml {
                port: Some(8080),
                ..Default::default()
            }),
            ..Default::default()
        };

        unsafe {
            env::set_var("SPEECH_KEY", "env-speech-key");
        }

        let config = merge_config(Some(yaml)).unwrap();

        assert_eq!(config.port, 8080); // from YAML
        assert_eq!(config.host, "0.0.0.0"); // default
        assert_eq!(config.azure_speech_key, Some("env-speech-key".to_string())); // from ENV

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_defaults_when_no_yaml_or_env() {
        cleanup_env_vars();

        let config = merge_config(None).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert_eq!(config.azure_speech_region, "westus2");
        assert_eq!(config.max_instances, 10);
        assert!(!config.auth_required);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_auth_config() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            auth: Some(super::super::yaml::AuthYaml {
                required: Some(true),
                api_secret: Some("yaml-secret".to_string()),
            }),
            ..Default::default()
        };

        unsafe {
            env::set_var("AUTH_API_SECRET", "env-secret");
        }

        let config = merge_config(Some(yaml)).unwrap();

        assert!(config.auth_required);
        assert_eq!(config.auth_api_secret, Some("yaml-secret".to_string())); // YAML wins

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_merge_invalid_endpoint_rejected() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            azure_openai: Some(super::super::yaml::AzureOpenAiYaml {
                endpoint: Some("not-a-url".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = merge_config(Some(yaml));
        assert!(result.is_err());

        cleanup_env_vars();
    }
}
