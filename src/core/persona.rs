//! Persona configuration
//!
//! A persona describes who an avatar instance is: display name, role, voice,
//! visual appearance, personality, and the system prompt assembled from all of
//! them. Personas load from `instances/<name>/persona.yaml` (or a template) and
//! fall back to a neutral default assistant when no file exists.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::instance_config::{ConfigError, deep_merge};

/// Voice settings for speech synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub language: String,
    pub model: String,
    pub pitch: String,
    pub rate: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            model: "en-US-JennyNeural".to_string(),
            pitch: "0Hz".to_string(),
            rate: 1.0,
        }
    }
}

/// Visual appearance of the rendered avatar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AvatarAppearance {
    pub character: String,
    pub style: String,
    pub background_color: String,
    pub video_bitrate: u32,
    pub video_framerate: u32,
}

impl Default for AvatarAppearance {
    fn default() -> Self {
        Self {
            character: "lisa".to_string(),
            style: "casual-sitting".to_string(),
            background_color: "#FFFFFF".to_string(),
            video_bitrate: 2_000_000,
            video_framerate: 25,
        }
    }
}

/// Personality descriptors folded into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Personality {
    pub traits: Vec<String>,
    pub tone: String,
    pub formality: String,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            traits: vec![
                "helpful".to_string(),
                "friendly".to_string(),
                "professional".to_string(),
            ],
            tone: "conversational".to_string(),
            formality: "moderate".to_string(),
        }
    }
}

/// Canned conversational phrases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationStyle {
    pub greeting: String,
    pub farewell: String,
    pub acknowledgment: String,
    pub thinking: String,
    pub error: String,
}

impl Default for ConversationStyle {
    fn default() -> Self {
        Self {
            greeting: "Hello! How can I help you today?".to_string(),
            farewell: "Thank you for chatting with me. Have a great day!".to_string(),
            acknowledgment: "I understand.".to_string(),
            thinking: "Let me think about that...".to_string(),
            error: "I apologize, but I encountered an issue.".to_string(),
        }
    }
}

/// A complete avatar persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Persona {
    pub name: String,
    pub role: String,
    pub voice: VoiceConfig,
    pub avatar: AvatarAppearance,
    pub personality: Personality,
    pub system_prompt: String,
    pub knowledge_domains: Vec<String>,
    pub tools: Vec<String>,
    pub conversation_style: ConversationStyle,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Default Avatar".to_string(),
            role: "AI Assistant".to_string(),
            voice: VoiceConfig::default(),
            avatar: AvatarAppearance::default(),
            personality: Personality::default(),
            system_prompt: "You are a helpful AI assistant.".to_string(),
            knowledge_domains: Vec::new(),
            tools: Vec::new(),
            conversation_style: ConversationStyle::default(),
        }
    }
}

impl Persona {
    /// Load a persona from a YAML or JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
            Some("json") => Ok(serde_json::from_str(&contents)?),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// The complete system prompt: base prompt plus role, traits, tone,
    /// knowledge domains, and tool access.
    pub fn system_prompt(&self) -> String {
        let mut parts = vec![self.system_prompt.clone()];

        if !self.role.is_empty() {
            parts.push(format!("Your role is: {}", self.role));
        }

        if !self.personality.traits.is_empty() {
            parts.push(format!(
                "Your personality traits are: {}",
                self.personality.traits.join(", ")
            ));
        }

        if !self.personality.tone.is_empty() {
            parts.push(format!(
                "Maintain a {} tone in your responses.",
                self.personality.tone
            ));
        }

        if !self.knowledge_domains.is_empty() {
            parts.push(format!(
                "You have expertise in: {}",
                self.knowledge_domains.join(", ")
            ));
        }

        if !self.tools.is_empty() {
            parts.push(format!(
                "You have access to these tools: {}",
                self.tools.join(", ")
            ));
        }

        parts.join("\n\n")
    }

    pub fn greeting(&self) -> &str {
        &self.conversation_style.greeting
    }

    pub fn farewell(&self) -> &str {
        &self.conversation_style.farewell
    }

    /// Deep-merge a partial override tree into this persona.
    pub fn apply_overrides(&mut self, overrides: serde_yaml::Value) -> Result<(), ConfigError> {
        let base = serde_yaml::to_value(&*self)?;
        let merged = deep_merge(base, overrides);
        *self = serde_yaml::from_value(merged)?;
        Ok(())
    }

    /// Validate the persona, returning a list of problems (empty when valid).
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("Persona name is required".to_string());
        }

        if self.system_prompt.is_empty() {
            errors.push("System prompt is required".to_string());
        }

        if self.voice.language.is_empty() {
            errors.push("Voice language is required".to_string());
        }

        if self.voice.model.is_empty() {
            errors.push("Voice model is required".to_string());
        }

        if self.avatar.character.is_empty() {
            errors.push("Avatar character is required".to_string());
        }

        if self.avatar.style.is_empty() {
            errors.push("Avatar style is required".to_string());
        }

        errors
    }

    /// Serialize to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Summary metadata for status endpoints.
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "role": self.role,
            "language": self.voice.language,
            "avatar_character": self.avatar.character,
            "knowledge_domains": self.knowledge_domains.len(),
            "tools": self.tools.len(),
            "personality_traits": self.personality.traits,
        })
    }
}
