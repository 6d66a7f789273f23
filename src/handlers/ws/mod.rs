//! # WebSocket Event Channel
//!
//! Bidirectional JSON event interface for browser clients. One connection can
//! drive instance lifecycle, sessions, and the realtime passthrough for a
//! single bound instance.
//!
//! ## Connection Flow
//! 1. Client connects to `/ws`
//! 2. Server emits `{"type": "connected", ...}`
//! 3. Client drives instances/sessions with JSON messages
//! 4. After `realtime_connect`, upstream realtime events stream back as
//!    `{"type": "realtime_event", ...}` and binary frames are treated as PCM16
//!    audio for the bound instance's input audio buffer
//!
//! ## Message Types
//!
//! **Incoming:**
//! - `{"type": "start_instance", "instance": "name"}`
//! - `{"type": "stop_instance", "instance": "name"}`
//! - `{"type": "start_session", "instance": "name", "session_id": "optional"}`
//! - `{"type": "stop_session", "instance": "name"}`
//! - `{"type": "message", "instance": "name", "message": {"type": "text", "content": "..."}}`
//! - `{"type": "realtime_connect", "instance": "name"}`
//! - `{"type": "realtime_send", "instance": "name", "event": {...}}` - raw upstream event
//! - `{"type": "realtime_disconnect", "instance": "name"}`
//! - **Binary frames** - PCM16 audio appended to the upstream input buffer
//!
//! **Outgoing:**
//! - `{"type": "connected", "timestamp": ...}`
//! - `{"type": "instance_started"|"instance_stopped", "instance": ..., "success": ...}`
//! - `{"type": "session_started", "instance": ..., "session_id": ...}`
//! - `{"type": "session_stopped", "instance": ..., "result": {...}}`
//! - `{"type": "response", "instance": ..., "response": {...}}` - plugin pipeline output
//! - `{"type": "realtime_connected"|"realtime_disconnected", "instance": ...}`
//! - `{"type": "realtime_event", "instance": ..., "event": {...}}` - forwarded upstream event
//! - `{"type": "error", "message": "..."}`

pub mod handler;
pub mod messages;
pub mod processor;
pub mod state;

pub use handler::ws_handler;
pub use messages::{IncomingMessage, OutgoingMessage};
pub use state::ConnectionState;
