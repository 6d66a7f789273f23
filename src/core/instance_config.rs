//! Per-instance configuration
//!
//! Each avatar instance carries a `config.yaml` describing its Azure wiring and
//! plugin list. The document is held as a YAML tree so templates and API
//! overrides can be deep-merged without a rigid schema, with three services on
//! top: `${VAR}` / `${VAR:default}` environment resolution, dot-path access
//! (`azure.openai.endpoint`), and validation.

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::{Mapping, Value};

/// Errors raised while loading or manipulating instance configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex"))
}

/// Instance configuration tree.
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    root: Value,
}

impl InstanceConfig {
    /// Wrap an existing YAML value. No environment resolution is applied.
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Load configuration from a YAML or JSON file and resolve environment
    /// placeholders.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let root = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            Some("json") => {
                let json: serde_json::Value = serde_json::from_str(&contents)?;
                serde_yaml::to_value(json)?
            }
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ));
            }
        };

        let mut config = Self { root };
        config.resolve_env();
        Ok(config)
    }

    /// Borrow the underlying YAML tree.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Consume the wrapper, returning the YAML tree.
    pub fn into_value(self) -> Value {
        self.root
    }

    /// Resolve `${VAR}` and `${VAR:default}` placeholders against the process
    /// environment. A full-string placeholder with no matching variable and no
    /// default is left intact; placeholders embedded in larger strings behave
    /// the same per occurrence.
    pub fn resolve_env(&mut self) {
        self.root = resolve_env_value(std::mem::take(&mut self.root));
    }

    /// Get a value by dot-separated path (e.g. `azure.openai.endpoint`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for key in path.split('.') {
            current = current.get(key)?;
        }
        Some(current)
    }

    /// Get a string value by dot-separated path.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Set a value by dot-separated path, creating intermediate mappings.
    pub fn set(&mut self, path: &str, value: Value) {
        if !self.root.is_mapping() {
            self.root = Value::Mapping(Mapping::new());
        }

        let keys: Vec<&str> = path.split('.').collect();
        let mut current = self
            .root
            .as_mapping_mut()
            .expect("root coerced to mapping above");

        for key in &keys[..keys.len() - 1] {
            let entry = current
                .entry(Value::String((*key).to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            current = entry.as_mapping_mut().expect("entry coerced to mapping");
        }

        current.insert(
            Value::String(keys[keys.len() - 1].to_string()),
            value,
        );
    }

    /// Deep-merge `updates` into this configuration. Mappings merge key by
    /// key with `updates` winning on conflicts; any other value replaces.
    pub fn merge(&mut self, updates: Value) {
        let base = std::mem::take(&mut self.root);
        self.root = deep_merge(base, updates);
    }

    /// Deep-merge `defaults` *under* this configuration: existing values win,
    /// defaults only fill gaps.
    pub fn merge_defaults(&mut self, defaults: Value) {
        let overrides = std::mem::take(&mut self.root);
        self.root = deep_merge(defaults, overrides);
    }

    /// Validate the configuration, returning a list of problems (empty when
    /// valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.get_str("instance.name").is_none() {
            errors.push("Required field missing: instance.name".to_string());
        }

        if let Some(openai) = self.get("azure.openai") {
            match openai.get("endpoint").and_then(|v| v.as_str()) {
                None => errors.push("Azure OpenAI endpoint is required".to_string()),
                Some(endpoint) if !endpoint.starts_with("http") => {
                    errors.push("Azure OpenAI endpoint must be a valid URL".to_string());
                }
                _ => {}
            }
        }

        if let Some(speech) = self.get("azure.speech") {
            if speech.get("key").and_then(|v| v.as_str()).is_none() {
                errors.push("Azure Speech key is required when speech is configured".to_string());
            }
            if speech.get("region").and_then(|v| v.as_str()).is_none() {
                errors
                    .push("Azure Speech region is required when speech is configured".to_string());
            }
        }

        if let Some(plugins) = self.get("plugins").and_then(|v| v.as_sequence()) {
            for (i, plugin) in plugins.iter().enumerate() {
                match plugin {
                    Value::String(_) => {}
                    Value::Mapping(map) => {
                        if map
                            .get("name")
                            .and_then(|v| v.as_str())
                            .is_none()
                        {
                            errors.push(format!("Plugin {i} missing required 'name' field"));
                        }
                    }
                    _ => errors.push(format!("Plugin {i} must be a string or a mapping")),
                }
            }
        }

        errors
    }

    /// Plugin configuration for a named plugin from the `plugins` list, if any.
    pub fn plugin_config(&self, plugin_name: &str) -> Option<Value> {
        let plugins = self.get("plugins")?.as_sequence()?;
        for plugin in plugins {
            match plugin {
                Value::String(name) if name == plugin_name => {
                    return Some(Value::Mapping(Mapping::new()));
                }
                Value::Mapping(map) => {
                    let name = map
                        .get("name")
                        .and_then(|v| v.as_str());
                    if name == Some(plugin_name) {
                        return Some(
                            map.get("config")
                                .cloned()
                                .unwrap_or_else(|| Value::Mapping(Mapping::new())),
                        );
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Serialize as YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// Serialize as pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Export as a JSON value (for API responses).
    pub fn to_json_value(&self) -> Result<serde_json::Value, ConfigError> {
        Ok(serde_json::to_value(&self.root)?)
    }

    /// Write to disk; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => self.to_yaml_string()?,
            Some("json") => self.to_json_string()?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ));
            }
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Deep merge: mappings combine recursively with `overlay` winning; any other
/// overlay value replaces the base outright.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.remove(&key) {
                    Some(base_value) => {
                        base_map.insert(key, deep_merge(base_value, overlay_value));
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn resolve_env_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, resolve_env_value(v)))
                .collect(),
        ),
        Value::Sequence(seq) => {
            Value::Sequence(seq.into_iter().map(resolve_env_value).collect())
        }
        Value::String(s) => Value::String(resolve_env_string(&s)),
        other => other,
    }
}

fn resolve_env_string(input: &str) -> String {
    placeholder_pattern()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let inner = &caps[1];
            let (var_name, default) = match inner.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (inner, None),
            };
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default {
                    Some(default) => default.to_string(),
                    // Leave the placeholder intact so missing variables are visible
                    None => caps[0].to_string(),
                },
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn config_from_yaml(yaml: &str) -> InstanceConfig {
        InstanceConfig::from_value(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_get_dot_path() {
        let config = config_from_yaml(
            r#"
azure:
  openai:
    endpoint: "https://res.openai.azure.com"
"#,
        );

        assert_eq!(
            config.get_str("azure.openai.endpoint"),
            Some("https://res.openai.azure.com")
        );
        assert!(config.get("azure.speech").is_none());
        assert!(config.get("missing.path").is_none());
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut config = InstanceConfig::default();
        config.set("instance.name", "demo".into());
        config.set("azure.openai.deployment", "gpt-4o-realtime-preview".into());

        assert_eq!(config.get_str("instance.name"), Some("demo"));
        assert_eq!(
            config.get_str("azure.openai.deployment"),
            Some("gpt-4o-realtime-preview")
        );
    }

    #[test]
    fn test_set_overwrites_scalar_with_mapping() {
        let mut config = config_from_yaml("instance: flat");
        config.set("instance.name", "demo".into());
        assert_eq!(config.get_str("instance.name"), Some("demo"));
    }

    #[test]
    fn test_deep_merge() {
        let mut config = config_from_yaml(
            r#"
instance:
  name: base
azure:
  speech:
    region: westus2
    key: base-key
"#,
        );

        config.merge(
            serde_yaml::from_str(
                r#"
azure:
  speech:
    region: eastus
"#,
            )
            .unwrap(),
        );

        assert_eq!(config.get_str("azure.speech.region"), Some("eastus"));
        assert_eq!(config.get_str("azure.speech.key"), Some("base-key"));
        assert_eq!(config.get_str("instance.name"), Some("base"));
    }

    #[test]
    fn test_merge_defaults_existing_wins() {
        let mut config = config_from_yaml(
            r#"
azure:
  speech:
    region: eastus
"#,
        );

        config.merge_defaults(
            serde_yaml::from_str(
                r#"
azure:
  speech:
    region: westus2
    key: default-key
"#,
            )
            .unwrap(),
        );

        assert_eq!(config.get_str("azure.speech.region"), Some("eastus"));
        assert_eq!(config.get_str("azure.speech.key"), Some("default-key"));
    }

    #[test]
    #[serial]
    fn test_env_resolution_full_placeholder() {
        unsafe {
            env::set_var("AVATAR_TEST_ENDPOINT", "https://from-env.example.com");
        }

        let mut config = config_from_yaml(
            r#"
azure:
  openai:
    endpoint: "${AVATAR_TEST_ENDPOINT}"
"#,
        );
        config.resolve_env();

        assert_eq!(
            config.get_str("azure.openai.endpoint"),
            Some("https://from-env.example.com")
        );

        unsafe {
            env::remove_var("AVATAR_TEST_ENDPOINT");
        }
    }

    #[test]
    #[serial]
    fn test_env_resolution_with_default() {
        unsafe {
            env::remove_var("AVATAR_TEST_MISSING");
        }

        let mut config = config_from_yaml(
            r#"
speech:
  region: "${AVATAR_TEST_MISSING:westus2}"
"#,
        );
        config.resolve_env();

        assert_eq!(config.get_str("speech.region"), Some("westus2"));
    }

    #[test]
    #[serial]
    fn test_env_resolution_unset_left_intact() {
        unsafe {
            env::remove_var("AVATAR_TEST_UNSET");
        }

        let mut config = config_from_yaml(
            r#"
api_key: "${AVATAR_TEST_UNSET}"
"#,
        );
        config.resolve_env();

        assert_eq!(config.get_str("api_key"), Some("${AVATAR_TEST_UNSET}"));
    }

    #[test]
    #[serial]
    fn test_env_resolution_embedded_placeholder() {
        unsafe {
            env::set_var("AVATAR_TEST_REGION", "eastus");
        }

        let mut config = config_from_yaml(
            r#"
endpoint: "https://${AVATAR_TEST_REGION}.tts.speech.microsoft.com"
"#,
        );
        config.resolve_env();

        assert_eq!(
            config.get_str("endpoint"),
            Some("https://eastus.tts.speech.microsoft.com")
        );

        unsafe {
            env::remove_var("AVATAR_TEST_REGION");
        }
    }

    #[test]
    fn test_validate_missing_instance_name() {
        let config = config_from_yaml("plugins: []");
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("instance.name")));
    }

    #[test]
    fn test_validate_openai_endpoint() {
        let config = config_from_yaml(
            r#"
instance:
  name: demo
azure:
  openai:
    endpoint: "not-a-url"
"#,
        );
        let errors = config.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.contains("endpoint must be a valid URL"))
        );
    }

    #[test]
    fn test_validate_speech_requires_key_and_region() {
        let config = config_from_yaml(
            r#"
instance:
  name: demo
azure:
  speech:
    region: westus2
"#,
        );
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("Azure Speech key")));
        assert!(!errors.iter().any(|e| e.contains("Azure Speech region")));
    }

    #[test]
    fn test_validate_plugins() {
        let config = config_from_yaml(
            r#"
instance:
  name: demo
plugins:
  - rag_plugin
  - name: tools_plugin
  - config: {}
  - 42
"#,
        );
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("Plugin 2")));
        assert!(errors.iter().any(|e| e.contains("Plugin 3")));
    }

    #[test]
    fn test_validate_clean_config() {
        let config = config_from_yaml(
            r#"
instance:
  name: demo
azure:
  openai:
    endpoint: "https://res.openai.azure.com"
    api_key: key
plugins:
  - rag_plugin
"#,
        );
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_plugin_config_lookup() {
        let config = config_from_yaml(
            r#"
plugins:
  - rag_plugin
  - name: tools_plugin
    config:
      max_execution_time: 5
"#,
        );

        // Bare string entry yields an empty config
        let rag = config.plugin_config("rag_plugin").unwrap();
        assert!(rag.as_mapping().unwrap().is_empty());

        let tools = config.plugin_config("tools_plugin").unwrap();
        assert_eq!(
            tools.get("max_execution_time").and_then(|v| v.as_u64()),
            Some(5)
        );

        assert!(config.plugin_config("unknown").is_none());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");

        let mut config = InstanceConfig::default();
        config.set("instance.name", "roundtrip".into());
        config.save(&path).unwrap();

        let loaded = InstanceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.get_str("instance.name"), Some("roundtrip"));
    }

    #[test]
    fn test_from_file_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"instance": {"name": "json-config"}}"#).unwrap();

        let loaded = InstanceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.get_str("instance.name"), Some("json-config"));
    }

    #[test]
    fn test_from_file_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "name = 'x'").unwrap();

        let result = InstanceConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = InstanceConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
