//! Plugin construction from instance configuration.
//!
//! The `plugins` list in an instance config names plugins either as bare
//! strings or as mappings with a `config` section:
//!
//! ```yaml
//! plugins:
//!   - rag_plugin
//!   - name: tools_plugin
//!     config:
//!       enabled_tools: [weather]
//! ```

use serde_yaml::Value;
use tracing::{error, warn};

use super::{Plugin, RagPlugin, ToolsPlugin};

/// A parsed plugin entry: name plus its configuration.
#[derive(Debug, Clone)]
pub struct PluginSpec {
    pub name: String,
    pub config: serde_json::Value,
}

impl PluginSpec {
    /// Parse the `plugins` list from an instance configuration value.
    pub fn parse_list(plugins: Option<&Value>) -> Vec<PluginSpec> {
        let Some(entries) = plugins.and_then(|v| v.as_sequence()) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(name) => Some(PluginSpec {
                    name: name.clone(),
                    config: serde_json::json!({}),
                }),
                Value::Mapping(map) => {
                    let name = map
                        .get("name")
                        .and_then(|v| v.as_str())?
                        .to_string();
                    let config = map
                        .get("config")
                        .cloned()
                        .and_then(|v| serde_json::to_value(v).ok())
                        .unwrap_or_else(|| serde_json::json!({}));
                    Some(PluginSpec { name, config })
                }
                other => {
                    warn!("Ignoring malformed plugin entry: {other:?}");
                    None
                }
            })
            .collect()
    }
}

/// Construct a plugin by name.
pub fn create_plugin(name: &str) -> Option<Box<dyn Plugin>> {
    match name {
        "rag_plugin" => Some(Box::new(RagPlugin::new())),
        "tools_plugin" => Some(Box::new(ToolsPlugin::new())),
        _ => None,
    }
}

/// Build and initialize the plugin chain for an instance.
///
/// Unknown plugins are skipped with a warning; a plugin whose initialization
/// fails is dropped rather than aborting instance creation. The returned
/// chain is sorted by priority, highest first.
pub fn load_plugins(specs: &[PluginSpec]) -> Vec<Box<dyn Plugin>> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::with_capacity(specs.len());

    for spec in specs {
        let Some(mut plugin) = create_plugin(&spec.name) else {
            warn!("Unknown plugin: {}", spec.name);
            continue;
        };

        match plugin.initialize(&spec.config) {
            Ok(()) => plugins.push(plugin),
            Err(e) => error!("Failed to initialize plugin {}: {e}", spec.name),
        }
    }

    plugins.sort_by(|a, b| b.priority().cmp(&a.priority()));
    plugins
}
