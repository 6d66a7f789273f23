//! WebSocket message dispatch.
//!
//! Routes parsed client messages to the instance manager and the bound
//! instance's realtime proxy. Failures surface to the client as `error`
//! messages; the connection itself stays open.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::state::AppState;

use super::{
    messages::{IncomingMessage, OutgoingMessage},
    state::ConnectionState,
};

/// Process one incoming WebSocket message
pub async fn handle_incoming_message(
    message: IncomingMessage,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) {
    match message {
        IncomingMessage::StartInstance { instance } => {
            let success = match app_state.manager.start_instance(&instance).await {
                Ok(()) => true,
                Err(e) => {
                    send_error(message_tx, format!("Failed to start {instance}: {e}")).await;
                    false
                }
            };
            if success {
                bind_connection(state, app_state, &instance).await;
            }
            let _ = message_tx
                .send(OutgoingMessage::InstanceStarted { instance, success })
                .await;
        }

        IncomingMessage::StopInstance { instance } => {
            let success = match app_state.manager.stop_instance(&instance).await {
                Ok(()) => true,
                Err(e) => {
                    send_error(message_tx, format!("Failed to stop {instance}: {e}")).await;
                    false
                }
            };
            let _ = message_tx
                .send(OutgoingMessage::InstanceStopped { instance, success })
                .await;
        }

        IncomingMessage::StartSession {
            instance,
            session_id,
        } => match app_state.manager.start_session(&instance, session_id).await {
            Ok(info) => {
                bind_connection(state, app_state, &instance).await;
                let _ = message_tx
                    .send(OutgoingMessage::SessionStarted {
                        instance,
                        session_id: info.session_id,
                    })
                    .await;
            }
            Err(e) => send_error(message_tx, format!("Failed to start session: {e}")).await,
        },

        IncomingMessage::StopSession { instance } => {
            match app_state.manager.stop_session(&instance).await {
                Ok(result) => {
                    let _ = message_tx
                        .send(OutgoingMessage::SessionStopped { instance, result })
                        .await;
                }
                Err(e) => send_error(message_tx, format!("Failed to stop session: {e}")).await,
            }
        }

        IncomingMessage::Message { instance, message } => {
            match app_state.manager.process_message(&instance, message).await {
                Ok(response) => {
                    let _ = message_tx
                        .send(OutgoingMessage::Response { instance, response })
                        .await;
                }
                Err(e) => send_error(message_tx, format!("Failed to process message: {e}")).await,
            }
        }

        IncomingMessage::RealtimeConnect { instance } => {
            handle_realtime_connect(instance, state, message_tx, app_state).await;
        }

        IncomingMessage::RealtimeSend { instance, event } => {
            let Some(engine) = app_state.manager.get_instance(&instance).await else {
                send_error(message_tx, format!("Instance {instance} not running")).await;
                return;
            };
            if let Err(e) = engine.send_realtime_event(&event).await {
                send_error(message_tx, format!("Realtime send failed: {e}")).await;
            }
        }

        IncomingMessage::RealtimeDisconnect { instance } => {
            let Some(engine) = app_state.manager.get_instance(&instance).await else {
                send_error(message_tx, format!("Instance {instance} not running")).await;
                return;
            };
            let Some(realtime) = engine.realtime() else {
                send_error(message_tx, "Realtime connection not available".to_string()).await;
                return;
            };
            if let Err(e) = realtime.write().await.disconnect().await {
                send_error(message_tx, format!("Realtime disconnect failed: {e}")).await;
                return;
            }
            state.write().await.realtime_bound = false;
            let _ = message_tx
                .send(OutgoingMessage::RealtimeDisconnected { instance })
                .await;
        }
    }
}

/// Handle a binary audio frame: append it to the bound instance's realtime
/// input buffer.
pub async fn handle_audio_frame(
    data: Bytes,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
) {
    let engine = { state.read().await.engine.clone() };

    let Some(engine) = engine else {
        send_error(
            message_tx,
            "No instance bound; start a session before sending audio".to_string(),
        )
        .await;
        return;
    };

    if let Err(e) = engine.append_realtime_audio(&data).await {
        warn!("Failed to forward audio frame: {e}");
        send_error(message_tx, format!("Failed to forward audio: {e}")).await;
    }
}

async fn handle_realtime_connect(
    instance: String,
    state: &Arc<RwLock<ConnectionState>>,
    message_tx: &mpsc::Sender<OutgoingMessage>,
    app_state: &Arc<AppState>,
) {
    let Some(engine) = app_state.manager.get_instance(&instance).await else {
        send_error(
            message_tx,
            "Instance not available or realtime not configured".to_string(),
        )
        .await;
        return;
    };

    let Some(realtime) = engine.realtime() else {
        send_error(
            message_tx,
            "Instance not available or realtime not configured".to_string(),
        )
        .await;
        return;
    };

    // Forward upstream events to this connection
    {
        let tx = message_tx.clone();
        let event_instance = instance.clone();
        let proxy = realtime.read().await;
        proxy
            .on_event(Box::new(move |event| {
                let tx = tx.clone();
                let instance = event_instance.clone();
                Box::pin(async move {
                    let _ = tx
                        .send(OutgoingMessage::RealtimeEvent {
                            instance,
                            event: event.payload,
                        })
                        .await;
                })
            }))
            .await;
    }

    let already_connected = realtime.read().await.is_connected();
    if !already_connected {
        let mut proxy = realtime.write().await;
        if let Err(e) = proxy.connect().await {
            send_error(message_tx, format!("Realtime connection failed: {e}")).await;
            return;
        }
    } else {
        debug!("Realtime proxy already connected for {instance}");
    }

    {
        let mut connection = state.write().await;
        connection.bind(&instance, engine);
        connection.realtime_bound = true;
    }

    let _ = message_tx
        .send(OutgoingMessage::RealtimeConnected { instance })
        .await;
}

async fn bind_connection(
    state: &Arc<RwLock<ConnectionState>>,
    app_state: &Arc<AppState>,
    instance: &str,
) {
    if let Some(engine) = app_state.manager.get_instance(instance).await {
        state.write().await.bind(instance, engine);
    }
}

async fn send_error(message_tx: &mpsc::Sender<OutgoingMessage>, message: String) {
    warn!("{message}");
    let _ = message_tx.send(OutgoingMessage::Error { message }).await;
}
