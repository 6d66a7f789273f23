//! Avatar factory.
//!
//! Creates avatar engines from instance directories and instantiates new
//! instances from templates: the template config is deep-merged with caller
//! overrides, stamped with an `instance` stanza, and written to
//! `instances/<name>/` alongside the persona and the `tools/` and
//! `knowledge_base/` directories. Instances can be exported to and imported
//! from zip packages.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;

use super::config_loader;
use crate::core::engine::{AvatarEngine, EngineError};
use crate::core::instance_config::{ConfigError, InstanceConfig};
use crate::core::persona::Persona;

/// Factory error types
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Filesystem layout the factory works against.
#[derive(Debug, Clone)]
pub struct FactoryPaths {
    pub instances_root: PathBuf,
    pub templates_root: PathBuf,
    pub personas_root: PathBuf,
    pub exports_root: PathBuf,
}

impl FactoryPaths {
    pub fn instance_dir(&self, name: &str) -> PathBuf {
        self.instances_root.join(name)
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.instance_dir(name).join("config.yaml")
    }

    pub fn persona_path(&self, name: &str) -> PathBuf {
        self.instance_dir(name).join("persona.yaml")
    }
}

/// Factory for creating and managing avatar instances on disk.
pub struct AvatarFactory {
    paths: FactoryPaths,
    /// Server-wide Azure defaults merged under every instance config.
    azure_defaults: Option<serde_yaml::Value>,
}

impl AvatarFactory {
    pub fn new(paths: FactoryPaths, azure_defaults: Option<serde_yaml::Value>) -> Self {
        Self {
            paths,
            azure_defaults,
        }
    }

    pub fn paths(&self) -> &FactoryPaths {
        &self.paths
    }

    /// Build an engine for an existing instance directory.
    pub fn create_avatar(&self, instance_name: &str) -> Result<AvatarEngine, FactoryError> {
        let config_path = self.paths.config_path(instance_name);
        if !config_path.exists() {
            return Err(FactoryError::NotFound(format!(
                "Instance configuration not found: {}",
                config_path.display()
            )));
        }

        info!("Creating avatar instance: {instance_name}");

        let mut config = InstanceConfig::from_file(&config_path)?;
        if let Some(defaults) = &self.azure_defaults {
            config.merge_defaults(defaults.clone());
        }

        // Point the RAG plugin at the instance's knowledge base directory
        // unless its config already names one
        wire_knowledge_base(
            &mut config,
            &self.paths.instance_dir(instance_name).join("knowledge_base"),
        );

        let persona_path = self.paths.persona_path(instance_name);
        let persona = if persona_path.exists() {
            Persona::from_file(&persona_path)?
        } else {
            warn!("No persona found for {instance_name}, using default");
            Persona::default()
        };

        let engine = AvatarEngine::new(instance_name, config, persona)?;
        info!("Avatar instance created successfully: {instance_name}");
        Ok(engine)
    }

    /// Create a new instance directory from a template, then build its
    /// engine.
    pub fn create_from_template(
        &self,
        instance_name: &str,
        template_name: &str,
        config_overrides: Option<serde_yaml::Value>,
    ) -> Result<AvatarEngine, FactoryError> {
        info!("Creating avatar {instance_name} from template {template_name}");

        let instance_dir = self.paths.instance_dir(instance_name);
        std::fs::create_dir_all(&instance_dir)?;

        let template = config_loader::load_template(&self.paths.templates_root, template_name)?;
        let mut config = InstanceConfig::from_value(template);

        if let Some(overrides) = config_overrides {
            config.merge(overrides);
        }

        config.set("instance.name", instance_name.into());
        config.set("instance.template", template_name.into());
        config.set("instance.version", "1.0.0".into());

        config.save(&self.paths.config_path(instance_name))?;

        // Copy the persona template when one exists for this template
        let persona_template = self.paths.personas_root.join(format!("{template_name}.yaml"));
        if persona_template.exists() {
            std::fs::copy(&persona_template, self.paths.persona_path(instance_name))?;
        }

        std::fs::create_dir_all(instance_dir.join("tools"))?;
        std::fs::create_dir_all(instance_dir.join("knowledge_base"))?;

        self.create_avatar(instance_name)
    }

    /// Instance directories containing a config.yaml.
    pub fn list_instances(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.paths.instances_root) else {
            return Vec::new();
        };

        let mut instances: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.is_dir() && path.join("config.yaml").exists() {
                    path.file_name().map(|n| n.to_string_lossy().to_string())
                } else {
                    None
                }
            })
            .collect();

        instances.sort();
        instances
    }

    /// Available template names.
    pub fn list_templates(&self) -> Vec<String> {
        config_loader::list_templates(&self.paths.templates_root)
    }

    /// Delete an instance directory. Returns false when the instance does
    /// not exist.
    pub fn delete_instance(&self, instance_name: &str) -> Result<bool, FactoryError> {
        let instance_dir = self.paths.instance_dir(instance_name);
        if !instance_dir.exists() {
            warn!("Instance not found: {instance_name}");
            return Ok(false);
        }

        std::fs::remove_dir_all(&instance_dir)?;
        info!("Instance deleted: {instance_name}");
        Ok(true)
    }

    /// Validate an instance on disk, returning the list of problems.
    pub fn validate_instance(&self, instance_name: &str) -> Vec<String> {
        let mut errors = Vec::new();

        let instance_dir = self.paths.instance_dir(instance_name);
        if !instance_dir.exists() {
            errors.push(format!("Instance directory not found: {instance_name}"));
            return errors;
        }

        let config_path = self.paths.config_path(instance_name);
        if !config_path.exists() {
            errors.push("Configuration file not found".to_string());
            return errors;
        }

        match InstanceConfig::from_file(&config_path) {
            Ok(config) => errors.extend(config.validate()),
            Err(e) => errors.push(format!("Configuration error: {e}")),
        }

        let persona_path = self.paths.persona_path(instance_name);
        if persona_path.exists() {
            match Persona::from_file(&persona_path) {
                Ok(persona) => errors.extend(persona.validate()),
                Err(e) => errors.push(format!("Persona error: {e}")),
            }
        }

        if !instance_dir.join("tools").exists() {
            errors.push("Tools directory not found".to_string());
        }

        if !instance_dir.join("knowledge_base").exists() {
            errors.push("Knowledge base directory not found".to_string());
        }

        errors
    }

    /// Export an instance directory as a zip package under the exports root.
    pub fn export_instance(
        &self,
        instance_name: &str,
        output_path: Option<PathBuf>,
    ) -> Result<PathBuf, FactoryError> {
        let instance_dir = self.paths.instance_dir(instance_name);
        if !instance_dir.exists() {
            return Err(FactoryError::NotFound(format!(
                "Instance not found: {instance_name}"
            )));
        }

        let output_path = output_path.unwrap_or_else(|| {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            self.paths
                .exports_root
                .join(format!("{instance_name}_{timestamp}.zip"))
        });

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::File::create(&output_path)?;
        let mut writer = zip::ZipWriter::new(file);
        zip_directory(&mut writer, &instance_dir, &instance_dir)?;
        writer.finish()?;

        info!("Instance exported: {}", output_path.display());
        Ok(output_path)
    }

    /// Import an instance from a zip package. Returns the instance name,
    /// generated from a timestamp when not supplied.
    pub fn import_instance(
        &self,
        package_path: &Path,
        instance_name: Option<String>,
    ) -> Result<String, FactoryError> {
        if !package_path.exists() {
            return Err(FactoryError::NotFound(format!(
                "Package not found: {}",
                package_path.display()
            )));
        }

        let instance_name = instance_name.unwrap_or_else(|| {
            format!("imported_{}", Utc::now().format("%Y%m%d_%H%M%S"))
        });

        let instance_dir = self.paths.instance_dir(&instance_name);
        std::fs::create_dir_all(&instance_dir)?;

        let file = std::fs::File::open(package_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(&instance_dir)?;

        // Rewrite the instance name in the imported config
        let config_path = self.paths.config_path(&instance_name);
        if config_path.exists() {
            let mut config = InstanceConfig::from_file(&config_path)?;
            config.set("instance.name", instance_name.as_str().into());
            config.save(&config_path)?;
        }

        info!("Instance imported: {instance_name}");
        Ok(instance_name)
    }
}

/// Rewrite `rag_plugin` entries so their config carries the instance's
/// knowledge base path. Entries that already name a path are left alone.
fn wire_knowledge_base(config: &mut InstanceConfig, kb_path: &Path) {
    if !kb_path.exists() {
        return;
    }
    let Some(plugins) = config.get("plugins").cloned() else {
        return;
    };
    let Some(entries) = plugins.as_sequence() else {
        return;
    };

    let kb_value: Value = kb_path.to_string_lossy().to_string().into();
    let rewritten: Vec<Value> = entries
        .iter()
        .map(|entry| match entry {
            Value::String(name) if name == "rag_plugin" => {
                let mut plugin_config = Mapping::new();
                plugin_config.insert("knowledge_base_path".into(), kb_value.clone());

                let mut map = Mapping::new();
                map.insert("name".into(), "rag_plugin".into());
                map.insert("config".into(), Value::Mapping(plugin_config));
                Value::Mapping(map)
            }
            Value::Mapping(map)
                if map
                    .get("name")
                    .and_then(|v| v.as_str())
                    == Some("rag_plugin") =>
            {
                let mut map = map.clone();
                let plugin_config = map
                    .entry("config".into())
                    .or_insert_with(|| Value::Mapping(Mapping::new()));
                if let Some(plugin_config) = plugin_config.as_mapping_mut()
                    && !plugin_config.contains_key("knowledge_base_path")
                {
                    plugin_config.insert("knowledge_base_path".into(), kb_value.clone());
                }
                Value::Mapping(map)
            }
            other => other.clone(),
        })
        .collect();

    config.set("plugins", Value::Sequence(rewritten));
}

/// Recursively add a directory tree to a zip archive with paths relative to
/// `prefix`.
fn zip_directory(
    writer: &mut zip::ZipWriter<std::fs::File>,
    dir: &Path,
    prefix: &Path,
) -> Result<(), FactoryError> {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(prefix)
            .expect("entry is under the prefix directory");
        let name = relative.to_string_lossy().replace('\\', "/");

        if path.is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            zip_directory(writer, &path, prefix)?;
        } else {
            writer.start_file(name, options)?;
            let bytes = std::fs::read(&path)?;
            writer.write_all(&bytes)?;
        }
    }

    Ok(())
}
