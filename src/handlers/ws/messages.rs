//! WebSocket message types.

use serde::{Deserialize, Serialize};

use crate::core::plugin::PluginMessage;

/// Messages received from WebSocket clients
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "start_instance")]
    StartInstance { instance: String },

    #[serde(rename = "stop_instance")]
    StopInstance { instance: String },

    #[serde(rename = "start_session")]
    StartSession {
        instance: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    #[serde(rename = "stop_session")]
    StopSession { instance: String },

    #[serde(rename = "message")]
    Message {
        instance: String,
        message: PluginMessage,
    },

    #[serde(rename = "realtime_connect")]
    RealtimeConnect { instance: String },

    /// Raw passthrough to the upstream realtime API
    #[serde(rename = "realtime_send")]
    RealtimeSend {
        instance: String,
        event: serde_json::Value,
    },

    #[serde(rename = "realtime_disconnect")]
    RealtimeDisconnect { instance: String },
}

/// Messages sent to WebSocket clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "connected")]
    Connected { timestamp: String },

    #[serde(rename = "instance_started")]
    InstanceStarted { instance: String, success: bool },

    #[serde(rename = "instance_stopped")]
    InstanceStopped { instance: String, success: bool },

    #[serde(rename = "session_started")]
    SessionStarted {
        instance: String,
        session_id: String,
    },

    #[serde(rename = "session_stopped")]
    SessionStopped {
        instance: String,
        result: serde_json::Value,
    },

    #[serde(rename = "response")]
    Response {
        instance: String,
        response: serde_json::Value,
    },

    #[serde(rename = "realtime_connected")]
    RealtimeConnected { instance: String },

    /// Upstream realtime event forwarded to the client
    #[serde(rename = "realtime_event")]
    RealtimeEvent {
        instance: String,
        event: serde_json::Value,
    },

    #[serde(rename = "realtime_disconnected")]
    RealtimeDisconnected { instance: String },

    #[serde(rename = "error")]
    Error { message: String },
}
