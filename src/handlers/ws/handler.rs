//! Axum WebSocket handler
//!
//! This module contains the WebSocket upgrade handler and the core
//! connection loop: a dedicated sender task drains outgoing messages from an
//! mpsc channel while the main loop processes client frames.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::{
    messages::{IncomingMessage, OutgoingMessage},
    processor::{handle_audio_frame, handle_incoming_message},
    state::ConnectionState,
};

/// Outgoing channel buffer size. Realtime event forwarding can burst, so
/// this is larger than a control-plane channel would need.
const CHANNEL_BUFFER_SIZE: usize = 256;

/// WebSocket upgrade handler for the `/ws` endpoint
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage one WebSocket session end to end
async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    let state = Arc::new(RwLock::new(ConnectionState::new()));
    let (message_tx, mut message_rx) = mpsc::channel::<OutgoingMessage>(CHANNEL_BUFFER_SIZE);

    // Dedicated sender task: serialize and ship outgoing messages
    let sender_task = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize outgoing message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let _ = message_tx
        .send(OutgoingMessage::Connected {
            timestamp: Utc::now().to_rfc3339(),
        })
        .await;

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!("Received text message: {} bytes", text.len());

                let incoming: IncomingMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Failed to parse incoming message: {}", e);
                        let _ = message_tx
                            .send(OutgoingMessage::Error {
                                message: format!("Invalid message format: {e}"),
                            })
                            .await;
                        continue;
                    }
                };

                handle_incoming_message(incoming, &state, &message_tx, &app_state).await;
            }
            Ok(Message::Binary(data)) => {
                debug!("Received binary message: {} bytes", data.len());
                handle_audio_frame(data, &state, &message_tx).await;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled automatically by axum
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket connection closed by client");
                break;
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    sender_task.abort();

    // Unbind the realtime callback so upstream events stop targeting this
    // closed connection. The instance itself keeps running.
    {
        let state_guard = state.read().await;
        if state_guard.realtime_bound
            && let Some(engine) = &state_guard.engine
            && let Some(realtime) = engine.realtime()
        {
            realtime.read().await.clear_callbacks().await;
        }
    }

    info!("WebSocket connection terminated");
}
