//! Avatar engine
//!
//! Per-instance orchestrator tying together the instance configuration, the
//! persona, the realtime proxy, the speech handler, and the plugin chain.
//! Construction is eager and side-effect free (no network): components are
//! built from the instance config, and connections only happen when a
//! session starts.

pub mod session;

pub use session::{SessionMetrics, SessionState, TranscriptEntry};

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::instance_config::InstanceConfig;
use super::persona::Persona;
use super::plugin::{Plugin, PluginMessage, PluginResponse, PluginSpec, load_plugins};
use super::realtime::{RealtimeConfig, RealtimeError, RealtimeProxy};
use super::speech::{AvatarVisualConfig, SpeechConfig, SpeechError, SpeechHandler};

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid instance configuration: {0}")]
    Config(String),

    #[error("A session is already active")]
    SessionAlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Speech(#[from] SpeechError),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Async tool function registered directly on the engine.
pub type ToolFn = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>
        + Send
        + Sync,
>;

/// Result of starting a session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub status: String,
}

/// Orchestrator for one avatar instance.
pub struct AvatarEngine {
    instance_name: String,
    config: InstanceConfig,
    persona: Persona,
    realtime: Option<Arc<RwLock<RealtimeProxy>>>,
    speech: Option<Arc<SpeechHandler>>,
    plugins: RwLock<Vec<Box<dyn Plugin>>>,
    tools: RwLock<HashMap<String, ToolFn>>,
    session: Mutex<SessionState>,
}

impl AvatarEngine {
    /// Build an engine from an instance configuration and persona.
    ///
    /// The realtime proxy is created when the config carries an
    /// `azure.openai` (or custom provider) section; the speech handler when
    /// it carries `azure.speech`. Plugins come from the `plugins` list, each
    /// initialized with its own config section.
    pub fn new(
        instance_name: impl Into<String>,
        config: InstanceConfig,
        persona: Persona,
    ) -> EngineResult<Self> {
        let instance_name = instance_name.into();

        let realtime = match config.get("azure") {
            Some(azure) if azure.get("openai").is_some() || azure.get("custom").is_some() => {
                let realtime_config = RealtimeConfig::from_value(azure)?;
                Some(Arc::new(RwLock::new(RealtimeProxy::new(realtime_config))))
            }
            _ => None,
        };

        let speech = match config.get("azure.speech") {
            Some(speech_section) => {
                let mut speech_config = SpeechConfig::from_value(speech_section)?;
                speech_config.apply_voice(&persona.voice);
                Some(Arc::new(SpeechHandler::new(speech_config)?))
            }
            None => None,
        };

        let specs = PluginSpec::parse_list(config.get("plugins"));
        let plugins = load_plugins(&specs);

        info!(
            "Avatar engine created for instance: {} ({} plugins)",
            instance_name,
            plugins.len()
        );

        Ok(Self {
            instance_name,
            config,
            persona,
            realtime,
            speech,
            plugins: RwLock::new(plugins),
            tools: RwLock::new(HashMap::new()),
            session: Mutex::new(SessionState::default()),
        })
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// The realtime proxy, when the instance is wired to an upstream.
    pub fn realtime(&self) -> Option<Arc<RwLock<RealtimeProxy>>> {
        self.realtime.clone()
    }

    /// The speech handler, when the instance is wired to Azure Speech.
    pub fn speech(&self) -> Option<Arc<SpeechHandler>> {
        self.speech.clone()
    }

    /// Whether a session is currently active.
    pub async fn session_active(&self) -> bool {
        self.session.lock().await.active
    }

    /// Start a new session.
    ///
    /// Connects the realtime proxy (configuring it with the persona's system
    /// prompt) and starts the avatar video bookkeeping. Upstream connection
    /// failures are logged but do not fail the session: the instance remains
    /// usable through the plugin pipeline, and the proxy keeps retrying in
    /// the background once connected.
    pub async fn start_session(&self, session_id: Option<String>) -> EngineResult<SessionInfo> {
        {
            let mut session = self.session.lock().await;
            if session.active {
                return Err(EngineError::SessionAlreadyActive);
            }
            let id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            session.start(id);
        }

        if let Some(realtime) = &self.realtime {
            let mut proxy = realtime.write().await;
            match proxy.connect().await {
                Ok(()) => {
                    let instructions = self.persona.system_prompt();
                    if let Err(e) = proxy
                        .configure_session(serde_json::json!({
                            "instructions": instructions,
                            "voice": self.persona.voice.model,
                        }))
                        .await
                    {
                        warn!("Failed to configure realtime session: {e}");
                    }
                }
                Err(e) => {
                    warn!("Realtime connection failed, continuing without upstream: {e}");
                }
            }
        }

        if let Some(speech) = &self.speech {
            speech
                .start_avatar(AvatarVisualConfig::from(&self.persona.avatar))
                .await?;
        }

        let session = self.session.lock().await;
        let session_id = session
            .session_id
            .clone()
            .expect("session id set by start()");
        info!("Session started: {session_id}");

        Ok(SessionInfo {
            session_id,
            status: "active".to_string(),
        })
    }

    /// Process a message through the plugin chain.
    ///
    /// The user turn is appended to the transcript, plugins run in priority
    /// order (a `final` response stops the chain), the merged response is
    /// appended as the assistant turn and optionally spoken.
    pub async fn process_message(
        &self,
        message: PluginMessage,
    ) -> EngineResult<serde_json::Value> {
        {
            let mut session = self.session.lock().await;
            if !session.active {
                return Err(EngineError::NoActiveSession);
            }
            session
                .transcript
                .push(TranscriptEntry::new("user", message.content.clone()));
            session.metrics.messages_received += 1;
        }

        let response = self.run_plugin_chain(&message).await;

        if !response.content.is_empty() {
            let mut session = self.session.lock().await;
            session
                .transcript
                .push(TranscriptEntry::new("assistant", response.content.clone()));
            session.metrics.messages_sent += 1;
        }

        let speak = message
            .metadata
            .get("speak")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        if speak && !response.content.is_empty() {
            if let Some(speech) = &self.speech {
                match speech.synthesize(&response.content, None).await {
                    Ok(audio) => info!("Spoke response ({} bytes of audio)", audio.len()),
                    Err(e) => warn!("Speech synthesis failed: {e}"),
                }
            }
        }

        Ok(serde_json::json!({
            "content": response.content,
            "metadata": response.metadata,
        }))
    }

    async fn run_plugin_chain(&self, message: &PluginMessage) -> PluginResponse {
        let mut merged = PluginResponse::default();

        let plugins = self.plugins.read().await;
        for plugin in plugins.iter() {
            if !plugin.enabled() {
                continue;
            }
            match plugin.process(message).await {
                Ok(Some(response)) => {
                    if !response.content.is_empty() {
                        merged.content = response.content;
                    }
                    merged.metadata.extend(response.metadata);
                    if response.is_final {
                        merged.is_final = true;
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Plugin {} processing error: {e}", plugin.name());
                }
            }
        }

        merged
    }

    /// Stop the active session, returning its final metrics.
    pub async fn stop_session(&self) -> EngineResult<serde_json::Value> {
        {
            let session = self.session.lock().await;
            if !session.active {
                return Err(EngineError::NoActiveSession);
            }
        }

        if let Some(realtime) = &self.realtime {
            if let Err(e) = realtime.write().await.disconnect().await {
                error!("Failed to disconnect realtime proxy: {e}");
            }
        }

        if let Some(speech) = &self.speech {
            speech.stop_avatar().await;
        }

        {
            let mut plugins = self.plugins.write().await;
            for plugin in plugins.iter_mut() {
                if let Err(e) = plugin.cleanup().await {
                    error!("Plugin {} cleanup error: {e}", plugin.name());
                }
            }
        }

        let (session_id, final_metrics) = {
            let mut session = self.session.lock().await;
            let metrics = session.metrics.clone();
            let (id, duration) = session.stop();
            (
                id.unwrap_or_default(),
                serde_json::json!({
                    "messages_sent": metrics.messages_sent,
                    "messages_received": metrics.messages_received,
                    "tokens_used": metrics.tokens_used,
                    "session_duration": duration,
                }),
            )
        };

        info!("Session stopped: {session_id}");

        Ok(serde_json::json!({
            "session_id": session_id,
            "status": "stopped",
            "metrics": final_metrics,
        }))
    }

    /// Current engine status.
    pub async fn status(&self) -> serde_json::Value {
        let session = self.session.lock().await;
        let plugins = self.plugins.read().await;
        let plugin_names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();

        serde_json::json!({
            "instance": self.instance_name,
            "session": {
                "active": session.active,
                "session_id": session.session_id,
                "duration": session.duration_seconds(),
            },
            "components": {
                "realtime_proxy": self.realtime.is_some(),
                "speech_handler": self.speech.is_some(),
                "plugins": plugin_names,
            },
            "metrics": session.metrics,
        })
    }

    /// Transcript of the current session.
    pub async fn conversation_history(&self) -> Vec<TranscriptEntry> {
        self.session.lock().await.transcript.clone()
    }

    /// Session metrics snapshot.
    pub async fn metrics(&self) -> SessionMetrics {
        self.session.lock().await.metrics.clone()
    }

    /// Register a named tool callable through `execute_tool`.
    pub async fn register_tool(&self, name: impl Into<String>, tool: ToolFn) {
        let name = name.into();
        info!("Tool registered: {name}");
        self.tools.write().await.insert(name, tool);
    }

    /// Execute a registered tool.
    pub async fn execute_tool(
        &self,
        name: &str,
        parameters: serde_json::Value,
    ) -> EngineResult<serde_json::Value> {
        let tool = self
            .tools
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ToolNotFound(name.to_string()))?;

        tool(parameters).await.map_err(EngineError::ToolExecution)
    }

    /// Forward a raw event to the upstream realtime API.
    pub async fn send_realtime_event(&self, event: &serde_json::Value) -> EngineResult<bool> {
        let realtime = self.realtime.as_ref().ok_or_else(|| {
            EngineError::Config("Instance has no realtime proxy configured".to_string())
        })?;
        let delivered = realtime.read().await.send_json(event).await?;
        Ok(delivered)
    }

    /// Append raw PCM audio to the upstream input buffer.
    pub async fn append_realtime_audio(&self, audio: &[u8]) -> EngineResult<bool> {
        let realtime = self.realtime.as_ref().ok_or_else(|| {
            EngineError::Config("Instance has no realtime proxy configured".to_string())
        })?;
        let delivered = realtime.read().await.send_audio(audio).await?;
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_engine() -> AvatarEngine {
        // No azure sections: engine runs purely on the plugin pipeline
        let config = InstanceConfig::from_value(
            serde_yaml::from_str(
                r#"
instance:
  name: test-instance
plugins:
  - rag_plugin
  - name: tools_plugin
    config:
      enabled_tools: [calculator]
"#,
            )
            .unwrap(),
        );
        AvatarEngine::new("test-instance", config, Persona::default()).unwrap()
    }

    #[tokio::test]
    async fn test_engine_construction() {
        let engine = offline_engine();
        assert_eq!(engine.instance_name(), "test-instance");
        assert!(engine.realtime().is_none());
        assert!(engine.speech().is_none());

        let status = engine.status().await;
        assert_eq!(status["components"]["realtime_proxy"], false);
        assert_eq!(status["components"]["plugins"][0], "rag_plugin");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let engine = offline_engine();
        assert!(!engine.session_active().await);

        let info = engine.start_session(Some("s-1".to_string())).await.unwrap();
        assert_eq!(info.session_id, "s-1");
        assert_eq!(info.status, "active");
        assert!(engine.session_active().await);

        let result = engine.stop_session().await.unwrap();
        assert_eq!(result["session_id"], "s-1");
        assert_eq!(result["status"], "stopped");
        assert!(!engine.session_active().await);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let engine = offline_engine();
        engine.start_session(None).await.unwrap();

        let result = engine.start_session(None).await;
        assert!(matches!(result, Err(EngineError::SessionAlreadyActive)));
    }

    #[tokio::test]
    async fn test_stop_without_session_rejected() {
        let engine = offline_engine();
        let result = engine.stop_session().await;
        assert!(matches!(result, Err(EngineError::NoActiveSession)));
    }

    #[tokio::test]
    async fn test_process_message_requires_session() {
        let engine = offline_engine();
        let result = engine.process_message(PluginMessage::text("hello")).await;
        assert!(matches!(result, Err(EngineError::NoActiveSession)));
    }

    #[tokio::test]
    async fn test_process_message_runs_plugin_chain() {
        let engine = offline_engine();
        engine.start_session(None).await.unwrap();

        // Tool call handled by the tools plugin (final response)
        let message = PluginMessage {
            kind: "tool_call".to_string(),
            content: r#"{"tool": "calculator", "parameters": {"expression": "2 + 2"}}"#
                .to_string(),
            metadata: serde_json::Value::Null,
        };
        let response = engine.process_message(message).await.unwrap();
        assert!(response["content"].as_str().unwrap().contains("4"));

        let history = engine.conversation_history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");

        let metrics = engine.metrics().await;
        assert_eq!(metrics.messages_received, 1);
        assert_eq!(metrics.messages_sent, 1);
    }

    #[tokio::test]
    async fn test_session_id_generated_when_absent() {
        let engine = offline_engine();
        let info = engine.start_session(None).await.unwrap();
        // Generated ids are UUIDs
        assert_eq!(info.session_id.len(), 36);
    }

    #[tokio::test]
    async fn test_register_and_execute_tool() {
        let engine = offline_engine();
        engine
            .register_tool(
                "echo",
                Arc::new(|params| Box::pin(async move { Ok(params) })),
            )
            .await;

        let result = engine
            .execute_tool("echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result["x"], 1);

        let missing = engine.execute_tool("nope", serde_json::json!({})).await;
        assert!(matches!(missing, Err(EngineError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_realtime_operations_require_proxy() {
        let engine = offline_engine();
        let result = engine
            .send_realtime_event(&serde_json::json!({"type": "response.create"}))
            .await;
        assert!(matches!(result, Err(EngineError::Config(_))));

        let result = engine.append_realtime_audio(&[0u8; 16]).await;
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_engine_with_custom_realtime_section() {
        let config = InstanceConfig::from_value(
            serde_yaml::from_str(
                r#"
instance:
  name: rt-instance
azure:
  provider: custom
  custom:
    endpoint: "ws://127.0.0.1:9/rt"
"#,
            )
            .unwrap(),
        );
        let engine = AvatarEngine::new("rt-instance", config, Persona::default()).unwrap();
        assert!(engine.realtime().is_some());

        // Without a live upstream the event is queued, not lost
        let delivered = engine
            .send_realtime_event(&serde_json::json!({"type": "response.create"}))
            .await
            .unwrap();
        assert!(!delivered);
    }
}
