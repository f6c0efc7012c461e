use std::sync::Arc;

use crate::runtime::AgentRuntime;

/// Shared state handed to every HTTP and WebSocket handler.
#[derive(Clone)]
pub struct ServeState {
    pub runtime: Arc<AgentRuntime>,
}

impl ServeState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}
