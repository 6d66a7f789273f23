//! Per-connection WebSocket state.

use std::sync::Arc;

use crate::core::engine::AvatarEngine;

/// State for one WebSocket connection.
///
/// A connection binds to the last instance it touched; binary audio frames
/// are routed to that instance's realtime proxy.
#[derive(Default)]
pub struct ConnectionState {
    /// Name of the bound instance.
    pub instance: Option<String>,
    /// Engine of the bound instance.
    pub engine: Option<Arc<AvatarEngine>>,
    /// Whether this connection registered a realtime event callback.
    pub realtime_bound: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind this connection to an instance.
    pub fn bind(&mut self, instance: &str, engine: Arc<AvatarEngine>) {
        self.instance = Some(instance.to_string());
        self.engine = Some(engine);
    }
}
