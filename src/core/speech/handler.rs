//! Azure Speech Services handler.
//!
//! One handler lives per avatar instance. Synthesis goes through the REST
//! API (connection reuse via a shared `reqwest::Client`); the avatar video
//! plane is negotiated client-side with a relay token, so `start_avatar`
//! only validates and records the active visual configuration.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::config::{
    AvatarVisualConfig, OUTPUT_FORMAT_HEADER, SUBSCRIPTION_KEY_HEADER, SpeechConfig,
};
use super::{SpeechError, SpeechResult};

/// User-Agent header value for speech requests.
const USER_AGENT: &str = "avatar-factory";

/// Known neural voices per language, used when the caller asks for a roster
/// without hitting the live voices API.
const VOICES: &[(&str, &[&str])] = &[
    (
        "en-US",
        &[
            "en-US-JennyNeural",
            "en-US-GuyNeural",
            "en-US-AriaNeural",
            "en-US-DavisNeural",
        ],
    ),
    ("es-AR", &["es-AR-ElenaNeural", "es-AR-TomasNeural"]),
    ("es-ES", &["es-ES-AlvaroNeural", "es-ES-ElviraNeural"]),
];

/// Handler for Azure Speech Services TTS and avatar support calls.
pub struct SpeechHandler {
    config: RwLock<SpeechConfig>,
    client: reqwest::Client,
    avatar_connected: AtomicBool,
    active_avatar: RwLock<Option<AvatarVisualConfig>>,
}

impl SpeechHandler {
    /// Create a handler from a speech configuration.
    pub fn new(config: SpeechConfig) -> SpeechResult<Self> {
        if config.key.is_empty() {
            return Err(SpeechError::InvalidConfiguration(
                "Speech subscription key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            config: RwLock::new(config),
            client,
            avatar_connected: AtomicBool::new(false),
            active_avatar: RwLock::new(None),
        })
    }

    /// Issue a short-lived speech token for client-side SDK usage.
    pub async fn issue_token(&self) -> SpeechResult<String> {
        let (url, key) = {
            let config = self.config.read().await;
            (config.token_url(), config.key.clone())
        };

        let response = self
            .client
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::TokenRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.text().await?)
    }

    /// Fetch an avatar relay token (ICE server credentials) for client-side
    /// WebRTC negotiation.
    pub async fn relay_token(&self) -> SpeechResult<serde_json::Value> {
        let (url, key) = {
            let config = self.config.read().await;
            (config.relay_token_url(), config.key.clone())
        };

        let response = self
            .client
            .get(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::TokenRequestFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }

    /// Synthesize text to audio, returning the raw audio bytes.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_override: Option<&str>,
    ) -> SpeechResult<Bytes> {
        if text.is_empty() {
            return Err(SpeechError::InvalidConfiguration(
                "Cannot synthesize empty text".to_string(),
            ));
        }

        let (url, key, ssml, output_format) = {
            let config = self.config.read().await;
            (
                config.tts_url(),
                config.key.clone(),
                config.build_ssml(text, voice_override),
                config.output_format.clone(),
            )
        };

        let response = self
            .client
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &key)
            .header("Content-Type", "application/ssml+xml")
            .header(OUTPUT_FORMAT_HEADER, &output_format)
            .body(ssml)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::SynthesisFailed {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        let audio = response.bytes().await?;
        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio)
    }

    /// Mark the avatar video stream as active and record its visual
    /// configuration. The actual WebRTC negotiation happens client-side with
    /// a relay token.
    pub async fn start_avatar(&self, visual: AvatarVisualConfig) -> SpeechResult<()> {
        *self.active_avatar.write().await = Some(visual);
        self.avatar_connected.store(true, Ordering::SeqCst);
        info!("Avatar started");
        Ok(())
    }

    /// Stop the avatar video stream. Returns false when no avatar was active.
    pub async fn stop_avatar(&self) -> bool {
        let was_connected = self.avatar_connected.swap(false, Ordering::SeqCst);
        if was_connected {
            *self.active_avatar.write().await = None;
            info!("Avatar stopped");
        }
        was_connected
    }

    /// Whether an avatar video stream is active.
    pub fn is_avatar_connected(&self) -> bool {
        self.avatar_connected.load(Ordering::SeqCst)
    }

    /// Update the synthesis voice.
    pub async fn update_voice(&self, voice_name: &str, language: Option<&str>) {
        let mut config = self.config.write().await;
        config.voice_name = voice_name.to_string();
        if let Some(language) = language {
            config.voice_language = language.to_string();
        }
        info!("Voice updated to: {voice_name}");
    }

    /// Known voices, optionally filtered by language.
    pub fn available_voices(language: Option<&str>) -> Vec<&'static str> {
        match language {
            Some(language) => VOICES
                .iter()
                .find(|(lang, _)| *lang == language)
                .map(|(_, voices)| voices.to_vec())
                .unwrap_or_default(),
            None => VOICES
                .iter()
                .flat_map(|(_, voices)| voices.iter().copied())
                .collect(),
        }
    }

    /// Current handler status.
    pub async fn status(&self) -> serde_json::Value {
        let config = self.config.read().await;
        let avatar = self.active_avatar.read().await;
        serde_json::json!({
            "avatar_connected": self.is_avatar_connected(),
            "current_voice": config.voice_name,
            "language": config.voice_language,
            "region": config.region,
            "output_format": config.output_format,
            "avatar_config": avatar.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persona::AvatarAppearance;

    fn test_handler() -> SpeechHandler {
        SpeechHandler::new(SpeechConfig {
            key: "test-key".to_string(),
            region: "eastus".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_key() {
        let result = SpeechHandler::new(SpeechConfig::default());
        assert!(matches!(result, Err(SpeechError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_avatar_lifecycle() {
        let handler = test_handler();
        assert!(!handler.is_avatar_connected());

        let visual = AvatarVisualConfig::from(&AvatarAppearance::default());
        handler.start_avatar(visual.clone()).await.unwrap();
        assert!(handler.is_avatar_connected());

        let status = handler.status().await;
        assert_eq!(status["avatar_connected"], true);
        assert_eq!(status["avatar_config"]["character"], "lisa");

        assert!(handler.stop_avatar().await);
        assert!(!handler.is_avatar_connected());

        // Stopping twice reports no active avatar
        assert!(!handler.stop_avatar().await);
    }

    #[tokio::test]
    async fn test_update_voice() {
        let handler = test_handler();
        handler
            .update_voice("es-ES-ElviraNeural", Some("es-ES"))
            .await;

        let status = handler.status().await;
        assert_eq!(status["current_voice"], "es-ES-ElviraNeural");
        assert_eq!(status["language"], "es-ES");
    }

    #[tokio::test]
    async fn test_update_voice_keeps_language_when_unset() {
        let handler = test_handler();
        handler.update_voice("en-US-GuyNeural", None).await;

        let status = handler.status().await;
        assert_eq!(status["current_voice"], "en-US-GuyNeural");
        assert_eq!(status["language"], "en-US");
    }

    #[test]
    fn test_available_voices_filtered() {
        let voices = SpeechHandler::available_voices(Some("es-AR"));
        assert_eq!(voices, vec!["es-AR-ElenaNeural", "es-AR-TomasNeural"]);
    }

    #[test]
    fn test_available_voices_all() {
        let voices = SpeechHandler::available_voices(None);
        assert!(voices.contains(&"en-US-JennyNeural"));
        assert!(voices.contains(&"es-ES-AlvaroNeural"));
        assert_eq!(voices.len(), 8);
    }

    #[test]
    fn test_available_voices_unknown_language() {
        let voices = SpeechHandler::available_voices(Some("xx-XX"));
        assert!(voices.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_rejects_empty_text() {
        let handler = test_handler();
        let result = handler.synthesize("", None).await;
        assert!(matches!(result, Err(SpeechError::InvalidConfiguration(_))));
    }
}
