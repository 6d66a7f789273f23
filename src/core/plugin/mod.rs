//! Plugin system
//!
//! Plugins extend an avatar instance with message-processing capabilities.
//! During `process_message` the engine walks the chain in priority order
//! (higher first); each plugin may contribute content and metadata, and a
//! plugin that marks its response `final` stops the chain.
//!
//! Lifecycle: `initialize(config)` at instance construction, `process` per
//! message, `cleanup` when the session or instance stops.

pub mod rag;
pub mod registry;
pub mod tools;

pub use rag::RagPlugin;
pub use registry::{PluginSpec, create_plugin, load_plugins};
pub use tools::ToolsPlugin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::masking::mask_sensitive;

/// Plugin error types
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution timed out after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

fn default_message_kind() -> String {
    "text".to_string()
}

/// A message flowing through the plugin chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMessage {
    /// Message kind: "text" for conversation turns, "tool_call" for explicit
    /// tool invocations.
    #[serde(rename = "type", default = "default_message_kind")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl PluginMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// A plugin's contribution to the response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PluginResponse {
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// When true, later plugins in the chain are skipped.
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Behavior contract for avatar plugins.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name as referenced from instance configuration.
    fn name(&self) -> &str;

    /// Execution priority (0-100, higher runs earlier).
    fn priority(&self) -> u8 {
        50
    }

    /// Whether the plugin participates in message processing.
    fn enabled(&self) -> bool {
        true
    }

    /// Enable or disable the plugin.
    fn set_enabled(&mut self, enabled: bool);

    /// The raw configuration the plugin was initialized with.
    fn config(&self) -> &serde_json::Value;

    /// Initialize the plugin with its configuration.
    fn initialize(&mut self, config: &serde_json::Value) -> PluginResult<()>;

    /// Process a message. `Ok(None)` means the plugin has nothing to
    /// contribute for this input.
    async fn process(&self, message: &PluginMessage) -> PluginResult<Option<PluginResponse>>;

    /// Release plugin resources.
    async fn cleanup(&mut self) -> PluginResult<()>;

    /// Configuration with credential values masked, safe for status output.
    fn safe_config(&self) -> serde_json::Value {
        mask_sensitive(self.config())
    }

    /// Plugin status summary.
    fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "enabled": self.enabled(),
            "priority": self.priority(),
            "config": self.safe_config(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullPlugin {
        enabled: bool,
        config: serde_json::Value,
    }

    #[async_trait]
    impl Plugin for NullPlugin {
        fn name(&self) -> &str {
            "null_plugin"
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        fn config(&self) -> &serde_json::Value {
            &self.config
        }

        fn initialize(&mut self, config: &serde_json::Value) -> PluginResult<()> {
            self.config = config.clone();
            Ok(())
        }

        async fn process(
            &self,
            _message: &PluginMessage,
        ) -> PluginResult<Option<PluginResponse>> {
            Ok(None)
        }

        async fn cleanup(&mut self) -> PluginResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plugin_message_defaults() {
        let message: PluginMessage =
            serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(message.kind, "text");
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn test_safe_config_masks_credentials() {
        let mut plugin = NullPlugin {
            enabled: true,
            config: serde_json::Value::Null,
        };
        plugin
            .initialize(&serde_json::json!({"api_key": "secret", "top_k": 5}))
            .unwrap();

        let safe = plugin.safe_config();
        assert_eq!(safe["api_key"], "***MASKED***");
        assert_eq!(safe["top_k"], 5);
    }

    #[test]
    fn test_status_shape() {
        let plugin = NullPlugin {
            enabled: true,
            config: serde_json::json!({}),
        };

        let status = plugin.status();
        assert_eq!(status["name"], "null_plugin");
        assert_eq!(status["enabled"], true);
        assert_eq!(status["priority"], 50);
    }
}
