//! Typed realtime protocol events.
//!
//! Client events follow the realtime API wire protocol (`session.update`,
//! `input_audio_buffer.append`, `conversation.item.create`,
//! `response.create`). Server events are demultiplexed by their `type` tag;
//! unknown types keep their raw payload so they can be relayed downstream
//! without loss.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::{RealtimeError, RealtimeResult};

/// Events sent to the upstream realtime API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session parameters (instructions, voice, modalities).
    #[serde(rename = "session.update")]
    SessionUpdate { session: serde_json::Value },

    /// Append base64-encoded audio to the input buffer.
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },

    /// Create a conversation item (user text message).
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Ask the model to produce a response.
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// A user text message as a conversation item.
    pub fn user_text(text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem {
                kind: "message".to_string(),
                role: "user".to_string(),
                content: vec![ContentPart {
                    kind: "text".to_string(),
                    text: text.into(),
                }],
            },
        }
    }

    /// Raw PCM audio as an input buffer append event.
    pub fn audio_chunk(audio: &[u8]) -> Self {
        ClientEvent::InputAudioAppend {
            audio: BASE64.encode(audio),
        }
    }

    /// Session update from instructions and a voice name.
    pub fn session_config(instructions: &str, voice: Option<&str>) -> Self {
        let mut session = serde_json::json!({ "instructions": instructions });
        if let Some(voice) = voice {
            session["voice"] = serde_json::Value::String(voice.to_string());
        }
        ClientEvent::SessionUpdate { session }
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> RealtimeResult<String> {
        serde_json::to_string(self)
            .map_err(|e| RealtimeError::ProtocolError(format!("Failed to encode event: {e}")))
    }
}

/// A conversation item inside `conversation.item.create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// A content part inside a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// An event received from the upstream realtime API.
///
/// The payload is kept whole; `event_type` is extracted for routing.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl ServerEvent {
    /// Parse a text frame from the upstream.
    pub fn parse(text: &str) -> RealtimeResult<Self> {
        let payload: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| RealtimeError::ProtocolError(format!("Invalid server event: {e}")))?;
        let event_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(Self {
            event_type,
            payload,
        })
    }

    /// Whether the upstream reported an error event.
    pub fn is_error(&self) -> bool {
        self.event_type == "error" || self.event_type.ends_with(".error")
    }
}
