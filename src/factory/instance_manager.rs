//! Instance lifecycle management.
//!
//! The manager is the shared registry of running avatar engines. It enforces
//! the instance limit, fronts session operations (auto-starting an instance
//! when a session is requested against a stopped one), and snapshots its
//! metadata to disk so restarts keep the session counters.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::avatar_factory::{AvatarFactory, FactoryError};
use crate::core::engine::{AvatarEngine, EngineError, SessionInfo};
use crate::core::plugin::PluginMessage;

/// Manager error types
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Instance {0} is not running")]
    NotRunning(String),

    #[error("Maximum instance limit reached ({0})")]
    LimitReached(usize),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Bookkeeping for one instance, persisted across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceMetadata {
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub sessions: u64,
}

/// Snapshot written by `save_state`.
#[derive(Debug, Serialize, Deserialize)]
struct ManagerState {
    instances: Vec<String>,
    metadata: HashMap<String, InstanceMetadata>,
    saved_at: DateTime<Utc>,
}

/// Registry and lifecycle manager for running avatar instances.
pub struct InstanceManager {
    factory: AvatarFactory,
    instances: RwLock<HashMap<String, Arc<AvatarEngine>>>,
    metadata: RwLock<HashMap<String, InstanceMetadata>>,
    max_instances: usize,
    state_path: PathBuf,
}

impl InstanceManager {
    pub fn new(factory: AvatarFactory, max_instances: usize, data_root: PathBuf) -> Self {
        Self {
            factory,
            instances: RwLock::new(HashMap::new()),
            metadata: RwLock::new(HashMap::new()),
            max_instances,
            state_path: data_root.join("instance_manager_state.json"),
        }
    }

    pub fn factory(&self) -> &AvatarFactory {
        &self.factory
    }

    /// Start an instance. Idempotent for instances that are already running.
    pub async fn start_instance(&self, instance_name: &str) -> ManagerResult<()> {
        {
            let instances = self.instances.read().await;
            if instances.contains_key(instance_name) {
                warn!("Instance {instance_name} is already running");
                return Ok(());
            }
            if instances.len() >= self.max_instances {
                return Err(ManagerError::LimitReached(self.max_instances));
            }
        }

        let engine = Arc::new(self.factory.create_avatar(instance_name)?);

        {
            let mut instances = self.instances.write().await;
            // Re-check under the write lock: another task may have started
            // this instance (or filled the last slot) meanwhile
            if instances.contains_key(instance_name) {
                return Ok(());
            }
            if instances.len() >= self.max_instances {
                return Err(ManagerError::LimitReached(self.max_instances));
            }
            instances.insert(instance_name.to_string(), engine);
        }

        {
            let mut metadata = self.metadata.write().await;
            let entry = metadata.entry(instance_name.to_string()).or_default();
            entry.status = "running".to_string();
            entry.started_at = Some(Utc::now());
            entry.stopped_at = None;
        }

        info!("Instance started: {instance_name}");
        Ok(())
    }

    /// Stop a running instance, closing its session and cleaning up plugins.
    pub async fn stop_instance(&self, instance_name: &str) -> ManagerResult<()> {
        let engine = {
            let mut instances = self.instances.write().await;
            instances
                .remove(instance_name)
                .ok_or_else(|| ManagerError::NotRunning(instance_name.to_string()))?
        };

        if engine.session_active().await {
            if let Err(e) = engine.stop_session().await {
                error!("Failed to stop session for {instance_name}: {e}");
            }
        }

        {
            let mut metadata = self.metadata.write().await;
            let entry = metadata.entry(instance_name.to_string()).or_default();
            entry.status = "stopped".to_string();
            entry.stopped_at = Some(Utc::now());
        }

        info!("Instance stopped: {instance_name}");
        Ok(())
    }

    /// Restart an instance (stop when running, then start).
    pub async fn restart_instance(&self, instance_name: &str) -> ManagerResult<()> {
        if self.instances.read().await.contains_key(instance_name) {
            self.stop_instance(instance_name).await?;
        }
        self.start_instance(instance_name).await
    }

    /// A running engine by name.
    pub async fn get_instance(&self, instance_name: &str) -> Option<Arc<AvatarEngine>> {
        self.instances.read().await.get(instance_name).cloned()
    }

    /// Names of running instances.
    pub async fn list_running_instances(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Status of one instance: running, stopped-on-disk, or not found.
    pub async fn instance_status(&self, instance_name: &str) -> serde_json::Value {
        if let Some(engine) = self.get_instance(instance_name).await {
            let metadata = self
                .metadata
                .read()
                .await
                .get(instance_name)
                .cloned()
                .unwrap_or_default();
            let engine_status = engine.status().await;

            return serde_json::json!({
                "name": instance_name,
                "status": "running",
                "started_at": metadata.started_at,
                "sessions": metadata.sessions,
                "current_session": engine_status["session"]["session_id"],
                "session_active": engine_status["session"]["active"],
                "plugins": engine_status["components"]["plugins"],
                "metrics": engine_status["metrics"],
            });
        }

        if self.factory.list_instances().contains(&instance_name.to_string()) {
            serde_json::json!({
                "name": instance_name,
                "status": "stopped",
                "exists": true,
            })
        } else {
            serde_json::json!({
                "name": instance_name,
                "status": "not_found",
                "exists": false,
            })
        }
    }

    /// Status of every instance, running and stopped.
    pub async fn all_status(&self) -> serde_json::Value {
        let running_names = self.list_running_instances().await;

        let mut running = Vec::with_capacity(running_names.len());
        let mut total_sessions = 0u64;
        for name in &running_names {
            let status = self.instance_status(name).await;
            total_sessions += status["sessions"].as_u64().unwrap_or(0);
            running.push(status);
        }

        let stopped: Vec<serde_json::Value> = self
            .factory
            .list_instances()
            .into_iter()
            .filter(|name| !running_names.contains(name))
            .map(|name| serde_json::json!({"name": name, "status": "stopped"}))
            .collect();

        serde_json::json!({
            "running_count": running.len(),
            "stopped_count": stopped.len(),
            "total_sessions": total_sessions,
            "running": running,
            "stopped": stopped,
        })
    }

    /// Start a session, auto-starting the instance when needed.
    pub async fn start_session(
        &self,
        instance_name: &str,
        session_id: Option<String>,
    ) -> ManagerResult<SessionInfo> {
        let engine = match self.get_instance(instance_name).await {
            Some(engine) => engine,
            None => {
                self.start_instance(instance_name).await?;
                self.get_instance(instance_name)
                    .await
                    .ok_or_else(|| ManagerError::NotRunning(instance_name.to_string()))?
            }
        };

        let info = engine.start_session(session_id).await?;

        {
            let mut metadata = self.metadata.write().await;
            let entry = metadata.entry(instance_name.to_string()).or_default();
            entry.sessions += 1;
        }

        Ok(info)
    }

    /// Stop the active session of a running instance.
    pub async fn stop_session(&self, instance_name: &str) -> ManagerResult<serde_json::Value> {
        let engine = self
            .get_instance(instance_name)
            .await
            .ok_or_else(|| ManagerError::NotRunning(instance_name.to_string()))?;
        Ok(engine.stop_session().await?)
    }

    /// Process a message against a running instance's active session.
    pub async fn process_message(
        &self,
        instance_name: &str,
        message: PluginMessage,
    ) -> ManagerResult<serde_json::Value> {
        let engine = self
            .get_instance(instance_name)
            .await
            .ok_or_else(|| ManagerError::NotRunning(instance_name.to_string()))?;
        Ok(engine.process_message(message).await?)
    }

    /// Stop every running instance.
    pub async fn shutdown_all(&self) {
        info!("Shutting down all instances...");

        let names = self.list_running_instances().await;
        for name in names {
            if let Err(e) = self.stop_instance(&name).await {
                error!("Failed to stop instance {name}: {e}");
            }
        }

        info!("All instances shut down");
    }

    /// Aggregate metrics across instances.
    pub async fn metrics(&self) -> serde_json::Value {
        let metadata = self.metadata.read().await;
        let total_sessions: u64 = metadata.values().map(|m| m.sessions).sum();

        let mut per_instance = serde_json::Map::new();
        for (name, engine) in self.instances.read().await.iter() {
            let engine_metrics = engine.metrics().await;
            per_instance.insert(
                name.clone(),
                serde_json::json!({
                    "sessions": metadata.get(name).map(|m| m.sessions).unwrap_or(0),
                    "current_session_active": engine.session_active().await,
                    "messages_processed": engine_metrics.messages_sent,
                }),
            );
        }

        serde_json::json!({
            "total_instances": self.factory.list_instances().len(),
            "running_instances": per_instance.len(),
            "total_sessions": total_sessions,
            "instances": per_instance,
        })
    }

    /// Persist metadata to the data directory.
    pub async fn save_state(&self) -> ManagerResult<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let state = ManagerState {
            instances: self.list_running_instances().await,
            metadata: self.metadata.read().await.clone(),
            saved_at: Utc::now(),
        };

        std::fs::write(&self.state_path, serde_json::to_string_pretty(&state)?)?;
        info!("State saved to {}", self.state_path.display());
        Ok(())
    }

    /// Load metadata from the data directory, if a snapshot exists.
    pub async fn load_state(&self) -> ManagerResult<()> {
        if !self.state_path.exists() {
            warn!("State file not found: {}", self.state_path.display());
            return Ok(());
        }

        let contents = std::fs::read_to_string(&self.state_path)?;
        let state: ManagerState = serde_json::from_str(&contents)?;

        *self.metadata.write().await = state.metadata;
        info!("State loaded from {}", self.state_path.display());
        Ok(())
    }
}
