//! Shared state for the ops endpoints.

use std::sync::Arc;

use crate::obs::RelayMetrics;
use crate::relay::{NamespaceRegistry, RelayState, RelayStatus};

#[derive(Clone)]
pub struct AppState {
    status: RelayStatus,
}

impl AppState {
    pub fn new(status: RelayStatus) -> Self {
        Self { status }
    }

    pub fn relay_state(&self) -> RelayState {
        self.status.state()
    }

    pub fn is_ready(&self) -> bool {
        self.relay_state() == RelayState::Listening
    }

    pub fn registry(&self) -> Arc<NamespaceRegistry> {
        Arc::clone(&self.status.registry)
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.status.metrics)
    }
}
