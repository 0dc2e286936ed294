//! Pub/sub transport seam.
//!
//! The relay never talks to a broker directly. It publishes through
//! [`Transport`] and consumes a dedicated [`SubscriberLink`], mirroring the
//! usual split between a publishing connection and a subscriber connection.
//! Delivery guarantees, reconnection, and TLS belong to the implementation.

pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;
#[cfg(feature = "redis")]
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use herald_core::error::{HeraldError, Result};

use crate::config::schema::{TransportKind, TransportSection};

pub use memory::MemoryBus;

/// One message delivered on a subscribed channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub payload: Bytes,
}

/// Publishing side of a pub/sub connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget publish. Failures surface as `HeraldError::Transport`.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()>;

    /// Open a subscriber connection with its own inbound stream.
    async fn open_link(&self) -> Result<Box<dyn SubscriberLink>>;
}

/// Subscriber connection: one inbound stream, delivered sequentially.
#[async_trait]
pub trait SubscriberLink: Send {
    /// Add a channel to this link. Re-subscribing is harmless.
    async fn subscribe(&mut self, channel: &str) -> Result<()>;

    /// Next inbound message; `None` once the connection is gone.
    async fn next_message(&mut self) -> Option<InboundMessage>;
}

/// Build the transport selected in config.
pub async fn connect(cfg: &TransportSection) -> Result<Arc<dyn Transport>> {
    cfg.validate()?;
    match cfg.kind {
        TransportKind::Memory => Ok(Arc::new(MemoryBus::new())),
        #[cfg(feature = "redis")]
        TransportKind::Redis => {
            let t = self::redis::RedisTransport::connect(cfg.endpoint()).await?;
            Ok(Arc::new(t))
        }
        #[cfg(feature = "nats")]
        TransportKind::Nats => {
            let t = nats::NatsTransport::connect(cfg.endpoint(), cfg.token.clone()).await?;
            Ok(Arc::new(t))
        }
        #[allow(unreachable_patterns)]
        kind => Err(HeraldError::Config(format!(
            "transport.kind = {} requires the `{}` feature",
            kind.as_str(),
            kind.as_str()
        ))),
    }
}
