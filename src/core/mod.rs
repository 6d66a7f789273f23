pub mod engine;
pub mod instance_config;
pub mod persona;
pub mod plugin;
pub mod realtime;
pub mod speech;

pub use engine::{AvatarEngine, EngineError, EngineResult};
pub use instance_config::InstanceConfig;
pub use persona::Persona;
