//! Realtime conversation proxy
//!
//! A WebSocket client that relays typed conversation and audio events between
//! this server and an upstream realtime API (Azure OpenAI by default, plain
//! OpenAI, or any custom endpoint).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │  send()/helpers  │────▶│ outbound (mpsc)   │────▶│  Connection Task │
//! └──────────────────┘     └───────────────────┘     └────────┬─────────┘
//!                                                             │
//!                          ┌───────────────────┐              │
//!                          │  event_tx (mpsc)  │◀─────────────┘
//!                          └────────┬──────────┘
//!                                   │
//!                          ┌────────▼──────────┐
//!                          │  Event Forward    │────▶ registered callback
//!                          │      Task         │
//!                          └───────────────────┘
//! ```
//!
//! The connection task owns the socket. When the upstream drops the
//! connection it retries with exponential backoff and jitter; events sent
//! while disconnected are queued (bounded) and flushed in order once the
//! socket is back.

pub mod backoff;
pub mod config;
pub mod messages;
pub mod proxy;

pub use backoff::ExponentialBackoff;
pub use config::{RealtimeConfig, RealtimeProvider};
pub use messages::{ClientEvent, ConversationItem, ServerEvent};
pub use proxy::{RealtimeProxy, RealtimeStatus};

/// Realtime proxy error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RealtimeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Event queue full ({0} pending events)")]
    QueueFull(usize),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for realtime operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;
