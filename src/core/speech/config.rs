//! Speech service configuration, endpoint URLs, and SSML construction.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{SpeechError, SpeechResult};
use crate::core::persona::{AvatarAppearance, VoiceConfig};

/// Default output format for synthesized audio.
pub const DEFAULT_OUTPUT_FORMAT: &str = "audio-24khz-96kbitrate-mono-mp3";

/// Azure subscription key header name.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Azure output format header name.
pub const OUTPUT_FORMAT_HEADER: &str = "X-Microsoft-OutputFormat";

/// Configuration for the Azure Speech Services handler.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub key: String,
    pub region: String,
    pub voice_name: String,
    pub voice_language: String,
    pub output_format: String,
    pub speaking_rate: Option<f32>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            region: "westus2".to_string(),
            voice_name: "en-US-JennyNeural".to_string(),
            voice_language: "en-US".to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            speaking_rate: None,
        }
    }
}

impl SpeechConfig {
    /// Build from the `azure.speech` section of an instance config.
    pub fn from_value(speech: &Value) -> SpeechResult<Self> {
        let key = speech
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SpeechError::InvalidConfiguration("azure.speech.key is required".to_string())
            })?
            .to_string();

        let region = speech
            .get("region")
            .and_then(|v| v.as_str())
            .unwrap_or("westus2")
            .to_string();

        Ok(Self {
            key,
            region,
            ..Default::default()
        })
    }

    /// Apply a persona's voice settings.
    pub fn apply_voice(&mut self, voice: &VoiceConfig) {
        self.voice_name = voice.model.clone();
        self.voice_language = voice.language.clone();
        if (voice.rate - 1.0).abs() > f32::EPSILON {
            self.speaking_rate = Some(voice.rate);
        }
    }

    /// The TTS synthesis endpoint for this region.
    pub fn tts_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }

    /// The token issuance endpoint for this region.
    pub fn token_url(&self) -> String {
        format!(
            "https://{}.api.cognitive.microsoft.com/sts/v1.0/issuetoken",
            self.region
        )
    }

    /// The avatar relay token endpoint for this region.
    pub fn relay_token_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/avatar/relay/token/v1",
            self.region
        )
    }

    /// Build the SSML body for a synthesis request.
    ///
    /// Text is XML-escaped; a prosody element wraps it when a non-default
    /// speaking rate is configured.
    pub fn build_ssml(&self, text: &str, voice_override: Option<&str>) -> String {
        let voice = voice_override.unwrap_or(&self.voice_name);
        let escaped = escape_xml(text);

        let inner = match self.speaking_rate {
            Some(rate) => format!(
                "<prosody rate=\"{:.0}%\">{escaped}</prosody>",
                rate * 100.0
            ),
            None => escaped,
        };

        format!(
            "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{}'>\
             <voice name='{voice}'>{inner}</voice>\
             </speak>",
            self.voice_language
        )
    }
}

/// Visual configuration for the rendered avatar, derived from the persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvatarVisualConfig {
    pub character: String,
    pub style: String,
    pub background_color: String,
    pub video_bitrate: u32,
    pub video_framerate: u32,
}

impl From<&AvatarAppearance> for AvatarVisualConfig {
    fn from(appearance: &AvatarAppearance) -> Self {
        Self {
            character: appearance.character.clone(),
            style: appearance.style.clone(),
            background_color: appearance.background_color.clone(),
            video_bitrate: appearance.video_bitrate,
            video_framerate: appearance.video_framerate,
        }
    }
}

/// Escape the five XML special characters.
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
