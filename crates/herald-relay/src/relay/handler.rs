use async_trait::async_trait;
use serde_json::Value;

use herald_core::error::Result;
use herald_core::protocol::envelope::{Envelope, Ident};

/// One decoded envelope routed to the relay's handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub namespace: String,
    pub event: String,
    pub message: Value,
    pub rooms: Vec<Ident>,
    pub user: Option<Ident>,
}

impl Delivery {
    pub fn new(namespace: impl Into<String>, env: Envelope) -> Self {
        Self {
            namespace: namespace.into(),
            event: env.event,
            message: env.message,
            rooms: env.rooms,
            user: env.user,
        }
    }
}

/// Handler shared by every namespace a relay knows about.
///
/// May be invoked concurrently with itself in `spawned` dispatch mode.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery) -> Result<()>;
}

/// Logs each delivery. Useful as a tap on a live prefix.
#[derive(Debug, Default)]
pub struct LogHandler;

#[async_trait]
impl NotificationHandler for LogHandler {
    async fn handle(&self, d: Delivery) -> Result<()> {
        tracing::info!(
            namespace = %d.namespace,
            event = %d.event,
            rooms = d.rooms.len(),
            user = ?d.user,
            message = %d.message,
            "delivery"
        );
        Ok(())
    }
}
