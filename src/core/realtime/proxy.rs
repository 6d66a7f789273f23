//! Realtime proxy WebSocket client.
//!
//! The proxy owns a supervised connection task. Outbound events travel over a
//! bounded channel for backpressure; inbound events are parsed and forwarded
//! to a registered async callback. An abnormal upstream close triggers
//! reconnection with exponential backoff, and events submitted while the
//! socket is down are queued and flushed in order on reconnect.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use super::backoff::ExponentialBackoff;
use super::config::RealtimeConfig;
use super::messages::{ClientEvent, ServerEvent};
use super::{RealtimeError, RealtimeResult};

/// Type alias for the async server-event callback.
pub type AsyncEventCallback =
    Box<dyn Fn(ServerEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Type alias for the async error callback.
pub type AsyncErrorCallback =
    Box<dyn Fn(RealtimeError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Outbound channel capacity. Small enough to exert backpressure on callers,
/// large enough to absorb audio chunk bursts.
const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Connection status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeStatus {
    pub connected: bool,
    pub endpoint: String,
    pub provider: String,
    pub queued_events: usize,
}

/// WebSocket client for an upstream realtime API.
pub struct RealtimeProxy {
    config: RealtimeConfig,

    /// Connection flag shared with the connection task.
    connected: Arc<AtomicBool>,

    /// Events waiting for a live socket, flushed oldest-first on connect.
    queued: Arc<Mutex<VecDeque<String>>>,

    /// Sender for outbound frames while connected.
    outbound_tx: Option<mpsc::Sender<String>>,

    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,

    /// Connection task handle.
    connection_handle: Option<tokio::task::JoinHandle<()>>,

    /// Event forwarding task handle.
    event_forward_handle: Option<tokio::task::JoinHandle<()>>,

    /// Error forwarding task handle.
    error_forward_handle: Option<tokio::task::JoinHandle<()>>,

    /// Registered server-event callback.
    event_callback: Arc<Mutex<Option<AsyncEventCallback>>>,

    /// Registered error callback.
    error_callback: Arc<Mutex<Option<AsyncErrorCallback>>>,
}

impl RealtimeProxy {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            queued: Arc::new(Mutex::new(VecDeque::new())),
            outbound_tx: None,
            shutdown_tx: None,
            connection_handle: None,
            event_forward_handle: None,
            error_forward_handle: None,
            event_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether the upstream socket is currently live.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register the callback invoked for every upstream event.
    pub async fn on_event(&self, callback: AsyncEventCallback) {
        *self.event_callback.lock().await = Some(callback);
    }

    /// Register the callback invoked for connection-level errors.
    pub async fn on_error(&self, callback: AsyncErrorCallback) {
        *self.error_callback.lock().await = Some(callback);
    }

    /// Remove the registered callbacks.
    pub async fn clear_callbacks(&self) {
        *self.event_callback.lock().await = None;
        *self.error_callback.lock().await = None;
    }

    /// Establish the upstream connection.
    ///
    /// Spawns the supervised connection task and waits for the first
    /// successful handshake (bounded by `connect_timeout_secs`). Later drops
    /// are handled inside the task with exponential backoff.
    pub async fn connect(&mut self) -> RealtimeResult<()> {
        if self.is_connected() {
            return Err(RealtimeError::ConnectionFailed(
                "Already connected".to_string(),
            ));
        }

        // Fail fast on an unbuildable URL before spawning anything
        self.config.build_url()?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<RealtimeError>();
        let (connected_tx, connected_rx) = oneshot::channel::<()>();

        self.outbound_tx = Some(outbound_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let connection_handle = tokio::spawn(run_connection(
            self.config.clone(),
            outbound_rx,
            shutdown_rx,
            event_tx,
            error_tx,
            self.connected.clone(),
            self.queued.clone(),
            connected_tx,
        ));
        self.connection_handle = Some(connection_handle);

        // Forward upstream events to the registered callback
        let event_callback_ref = self.event_callback.clone();
        self.event_forward_handle = Some(tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Some(callback) = event_callback_ref.lock().await.as_ref() {
                    callback(event).await;
                } else {
                    debug!("Realtime event (no callback): {}", event.event_type);
                }
            }
        }));

        // Forward connection errors to the registered callback
        let error_callback_ref = self.error_callback.clone();
        self.error_forward_handle = Some(tokio::spawn(async move {
            while let Some(err) = error_rx.recv().await {
                if let Some(callback) = error_callback_ref.lock().await.as_ref() {
                    callback(err).await;
                } else {
                    warn!("Realtime proxy error (no callback): {}", err);
                }
            }
        }));

        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
        match timeout(connect_timeout, connected_rx).await {
            Ok(Ok(())) => {
                info!(
                    "Realtime proxy connected ({})",
                    self.config.provider.as_str()
                );
                Ok(())
            }
            Ok(Err(_)) => {
                self.shutdown_tasks().await;
                Err(RealtimeError::ConnectionFailed(
                    "Connection task ended before confirming the handshake".to_string(),
                ))
            }
            Err(_) => {
                self.shutdown_tasks().await;
                Err(RealtimeError::ConnectionFailed(format!(
                    "Timed out waiting for upstream handshake after {connect_timeout:?}"
                )))
            }
        }
    }

    /// Send a typed event upstream.
    ///
    /// Returns `Ok(true)` when the event was handed to a live socket and
    /// `Ok(false)` when it was queued for the next (re)connect. Fails with
    /// [`RealtimeError::QueueFull`] when the offline queue is at capacity.
    pub async fn send(&self, event: &ClientEvent) -> RealtimeResult<bool> {
        self.send_frame(event.to_json()?).await
    }

    /// Send a raw JSON event upstream, bypassing the typed layer.
    ///
    /// Used by the passthrough path where clients speak the upstream protocol
    /// directly.
    pub async fn send_json(&self, event: &serde_json::Value) -> RealtimeResult<bool> {
        let frame = serde_json::to_string(event)
            .map_err(|e| RealtimeError::ProtocolError(format!("Failed to encode event: {e}")))?;
        self.send_frame(frame).await
    }

    async fn send_frame(&self, frame: String) -> RealtimeResult<bool> {
        if self.is_connected()
            && let Some(tx) = &self.outbound_tx
            && tx.send(frame.clone()).await.is_ok()
        {
            return Ok(true);
        }

        let mut pending = self.queued.lock().await;
        if pending.len() >= self.config.queue_capacity {
            return Err(RealtimeError::QueueFull(pending.len()));
        }
        pending.push_back(frame);
        Ok(false)
    }

    /// Configure the upstream session (`session.update`).
    pub async fn configure_session(&self, session: serde_json::Value) -> RealtimeResult<bool> {
        self.send(&ClientEvent::SessionUpdate { session }).await
    }

    /// Send a user text message (`conversation.item.create`).
    pub async fn send_text(&self, text: &str) -> RealtimeResult<bool> {
        self.send(&ClientEvent::user_text(text)).await
    }

    /// Send raw PCM audio (`input_audio_buffer.append`).
    pub async fn send_audio(&self, audio: &[u8]) -> RealtimeResult<bool> {
        self.send(&ClientEvent::audio_chunk(audio)).await
    }

    /// Ask the model for a response (`response.create`).
    pub async fn request_response(&self) -> RealtimeResult<bool> {
        self.send(&ClientEvent::ResponseCreate).await
    }

    /// Current connection status.
    pub async fn status(&self) -> RealtimeStatus {
        RealtimeStatus {
            connected: self.is_connected(),
            endpoint: self.config.display_endpoint(),
            provider: self.config.provider.as_str().to_string(),
            queued_events: self.queued.lock().await.len(),
        }
    }

    /// Disconnect from the upstream and stop all tasks.
    pub async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.shutdown_tasks().await;
        info!("Realtime proxy disconnected");
        Ok(())
    }

    async fn shutdown_tasks(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.connection_handle.take() {
            let _ = timeout(Duration::from_secs(5), handle).await;
        }

        if let Some(handle) = self.event_forward_handle.take() {
            handle.abort();
        }

        if let Some(handle) = self.error_forward_handle.take() {
            handle.abort();
        }

        self.outbound_tx = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for RealtimeProxy {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// The supervised connection task.
///
/// Owns the socket for its whole lifetime. Structure mirrors the streaming
/// clients elsewhere in this codebase: a select loop over outbound frames,
/// inbound frames, and the shutdown signal, wrapped in a reconnect loop.
#[allow(clippy::too_many_arguments)]
async fn run_connection(
    config: RealtimeConfig,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    error_tx: mpsc::UnboundedSender<RealtimeError>,
    connected: Arc<AtomicBool>,
    queued: Arc<Mutex<VecDeque<String>>>,
    connected_signal: oneshot::Sender<()>,
) {
    let url = match config.build_url() {
        Ok(url) => url,
        Err(e) => {
            let _ = error_tx.send(e);
            return;
        }
    };

    let mut connected_signal = Some(connected_signal);
    let mut backoff = ExponentialBackoff::new(
        Duration::from_millis(500),
        Duration::from_secs(30),
        config.max_reconnect_attempts,
    );

    'reconnect: loop {
        let mut request = match url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                let _ = error_tx.send(RealtimeError::InvalidConfiguration(format!(
                    "Failed to build WebSocket request: {e}"
                )));
                return;
            }
        };

        for (name, value) in config.request_headers() {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!("Skipping invalid header name: {name}");
                continue;
            };
            let Ok(value) = HeaderValue::from_str(&value) else {
                warn!("Skipping invalid header value for {name}");
                continue;
            };
            request.headers_mut().insert(name, value);
        }

        let ws_stream = match timeout(Duration::from_secs(30), connect_async(request)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                let realtime_error =
                    RealtimeError::ConnectionFailed(format!("Failed to connect: {e}"));
                error!("{realtime_error}");
                let _ = error_tx.send(realtime_error);
                match backoff.next_delay() {
                    Some(delay) => {
                        warn!("Retrying realtime connection in {:?}", delay);
                        tokio::time::sleep(delay).await;
                        continue 'reconnect;
                    }
                    None => {
                        let _ = error_tx.send(RealtimeError::ConnectionFailed(
                            "Reconnect attempts exhausted".to_string(),
                        ));
                        break 'reconnect;
                    }
                }
            }
            Err(_) => {
                let realtime_error = RealtimeError::ConnectionFailed(
                    "Connection attempt timed out after 30 seconds".to_string(),
                );
                error!("{realtime_error}");
                let _ = error_tx.send(realtime_error);
                match backoff.next_delay() {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        continue 'reconnect;
                    }
                    None => {
                        let _ = error_tx.send(RealtimeError::ConnectionFailed(
                            "Reconnect attempts exhausted".to_string(),
                        ));
                        break 'reconnect;
                    }
                }
            }
        };

        info!(
            "Connected to realtime upstream: {}",
            config.display_endpoint()
        );
        connected.store(true, Ordering::SeqCst);
        if let Some(signal) = connected_signal.take() {
            let _ = signal.send(());
        }
        backoff.reset();

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        // Flush events queued while disconnected, oldest first. A frame is
        // only dropped from the queue once the socket accepted it.
        loop {
            let frame = { queued.lock().await.pop_front() };
            let Some(frame) = frame else { break };
            if let Err(e) = ws_sink.send(Message::Text(frame.clone().into())).await {
                warn!("Failed to flush queued event, requeueing: {e}");
                queued.lock().await.push_front(frame);
                break;
            }
        }

        let mut clean_shutdown = false;

        loop {
            tokio::select! {
                maybe_frame = outbound_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if let Err(e) = ws_sink.send(Message::Text(frame.into())).await {
                                let realtime_error = RealtimeError::NetworkError(format!(
                                    "Failed to send event upstream: {e}"
                                ));
                                error!("{realtime_error}");
                                let _ = error_tx.send(realtime_error);
                                break;
                            }
                        }
                        None => {
                            // Proxy dropped; treat as shutdown
                            clean_shutdown = true;
                            break;
                        }
                    }
                }

                message = ws_source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match ServerEvent::parse(&text) {
                                Ok(event) => {
                                    if event.is_error() {
                                        warn!("Upstream reported error event: {}", text);
                                    }
                                    if event_tx.send(event).is_err() {
                                        warn!("Event channel closed, stopping connection task");
                                        clean_shutdown = true;
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to parse upstream event: {e}"),
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!("Ignoring {} byte binary frame from upstream", data.len());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Upstream closed the connection: {:?}", frame);
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ping/Pong handled by tungstenite
                        }
                        Some(Err(e)) => {
                            let realtime_error =
                                RealtimeError::NetworkError(format!("WebSocket error: {e}"));
                            error!("{realtime_error}");
                            let _ = error_tx.send(realtime_error);
                            break;
                        }
                        None => {
                            info!("Upstream stream ended");
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    info!("Realtime proxy shutdown requested");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    clean_shutdown = true;
                    break;
                }
            }
        }

        connected.store(false, Ordering::SeqCst);

        if clean_shutdown {
            break 'reconnect;
        }

        match backoff.next_delay() {
            Some(delay) => {
                warn!("Realtime connection lost, reconnecting in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            None => {
                let _ = error_tx.send(RealtimeError::ConnectionFailed(
                    "Reconnect attempts exhausted".to_string(),
                ));
                break 'reconnect;
            }
        }
    }

    info!("Realtime proxy connection task finished");
}
