//! Template and configuration file loading.
//!
//! Templates live under the configured templates root as `<name>.yaml`,
//! `<name>.yml`, or `<name>.json`. When no template file exists a built-in
//! basic template is used, carrying environment placeholders for the Azure
//! credentials so instances stay portable across deployments.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use super::avatar_factory::FactoryError;

/// Load a YAML or JSON configuration file into a YAML tree.
pub fn load_config(path: &Path) -> Result<Value, FactoryError> {
    if !path.exists() {
        return Err(FactoryError::NotFound(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
        Some("json") => {
            let json: serde_json::Value = serde_json::from_str(&contents)?;
            Ok(serde_yaml::to_value(json)?)
        }
        other => Err(FactoryError::InvalidConfig(format!(
            "Unsupported configuration format: {}",
            other.unwrap_or("<none>")
        ))),
    }
}

/// Save a configuration tree to disk; the format follows the extension.
pub fn save_config(config: &Value, path: &Path) -> Result<(), FactoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::to_string(config)?,
        Some("json") => {
            let json: serde_json::Value = serde_json::to_value(config)?;
            serde_json::to_string_pretty(&json)?
        }
        other => {
            return Err(FactoryError::InvalidConfig(format!(
                "Unsupported configuration format: {}",
                other.unwrap_or("<none>")
            )));
        }
    };

    std::fs::write(path, contents)?;
    Ok(())
}

/// Load a template by name from the templates root, falling back to the
/// built-in basic template.
pub fn load_template(templates_root: &Path, name: &str) -> Result<Value, FactoryError> {
    for extension in ["yaml", "yml", "json"] {
        let candidate = templates_root.join(format!("{name}.{extension}"));
        if candidate.exists() {
            debug!("Loading template from {}", candidate.display());
            return load_config(&candidate);
        }
    }

    debug!("Template '{name}' not found on disk, using built-in default");
    Ok(default_template())
}

/// List the templates available under the templates root.
pub fn list_templates(templates_root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(templates_root) else {
        return Vec::new();
    };

    let mut templates: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let extension = path.extension().and_then(|e| e.to_str())?;
            if matches!(extension, "yaml" | "yml" | "json") {
                path.file_stem().map(|s| s.to_string_lossy().to_string())
            } else {
                None
            }
        })
        .collect();

    templates.sort();
    templates.dedup();
    templates
}

/// The built-in basic template. Azure credentials are environment
/// placeholders resolved at instance load time.
pub fn default_template() -> Value {
    serde_yaml::from_str(
        r#"
instance:
  name: new_avatar
  version: "1.0.0"
  environment: development

azure:
  openai:
    endpoint: "${AZURE_OPENAI_ENDPOINT}"
    api_key: "${AZURE_OPENAI_API_KEY}"
    deployment: "gpt-4o-realtime-preview"
    api_version: "2025-04-01-preview"
  speech:
    key: "${SPEECH_KEY}"
    region: "${SPEECH_REGION:westus2}"

plugins:
  - rag_plugin
"#,
    )
    .expect("built-in template is valid YAML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_template_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("concierge.yaml"),
            "instance:\n  name: concierge\n",
        )
        .unwrap();

        let template = load_template(temp_dir.path(), "concierge").unwrap();
        assert_eq!(
            template
                .get("instance")
                .and_then(|i| i.get("name"))
                .and_then(|v| v.as_str()),
            Some("concierge")
        );
    }

    #[test]
    fn test_load_template_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let template = load_template(temp_dir.path(), "missing").unwrap();

        assert_eq!(
            template
                .get("azure")
                .and_then(|a| a.get("openai"))
                .and_then(|o| o.get("endpoint"))
                .and_then(|v| v.as_str()),
            Some("${AZURE_OPENAI_ENDPOINT}")
        );
    }

    #[test]
    fn test_list_templates() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.yaml"), "x: 1").unwrap();
        fs::write(temp_dir.path().join("b.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("readme.txt"), "skip").unwrap();

        let templates = list_templates(temp_dir.path());
        assert_eq!(templates, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_list_templates_missing_dir() {
        assert!(list_templates(Path::new("/nonexistent/templates")).is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.yaml");

        let config: Value = serde_yaml::from_str("instance:\n  name: saved\n").unwrap();
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(
            loaded
                .get("instance")
                .and_then(|i| i.get("name"))
                .and_then(|v| v.as_str()),
            Some("saved")
        );
    }

    #[test]
    fn test_load_config_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        fs::write(&path, "[section]").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(FactoryError::InvalidConfig(_))));
    }
}
