//! Azure Speech Services integration
//!
//! Covers the three REST surfaces an avatar instance needs:
//! - text-to-speech synthesis (SSML over the `cognitiveservices/v1` endpoint),
//! - short-lived token issuance for client-side Speech SDK usage,
//! - avatar relay tokens (ICE server credentials for client-side WebRTC).
//!
//! The media plane itself stays in the browser; this module only does the
//! server-side REST calls and tracks which avatar visual configuration is
//! active for the current session.

pub mod config;
pub mod handler;

pub use config::{AvatarVisualConfig, SpeechConfig};
pub use handler::SpeechHandler;

/// Speech service error types
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Synthesis failed ({status}): {detail}")]
    SynthesisFailed { status: u16, detail: String },

    #[error("Token request failed ({status}): {detail}")]
    TokenRequestFailed { status: u16, detail: String },

    #[error("Avatar not connected")]
    AvatarNotConnected,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Result type for speech operations
pub type SpeechResult<T> = Result<T, SpeechError>;
