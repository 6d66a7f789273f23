use std::sync::Arc;

use crate::config::ServerConfig;
use crate::factory::avatar_factory::{AvatarFactory, FactoryPaths};
use crate::factory::instance_manager::InstanceManager;

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Shared registry of running avatar instances
    pub manager: Arc<InstanceManager>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let paths = FactoryPaths {
            instances_root: config.instances_root.clone(),
            templates_root: config.templates_root.clone(),
            personas_root: config.personas_root.clone(),
            exports_root: config.data_root.join("exports"),
        };

        let factory = AvatarFactory::new(paths, config.azure_defaults());
        let manager = Arc::new(InstanceManager::new(
            factory,
            config.max_instances,
            config.data_root.clone(),
        ));

        // Best effort: a missing snapshot is normal on first boot
        if let Err(e) = manager.load_state().await {
            tracing::warn!("Failed to load instance manager state: {e}");
        }

        Arc::new(Self { config, manager })
    }
}
