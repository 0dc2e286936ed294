//! Namespace-side peer of the relay.
//!
//! Wraps a [`Publisher`] and listens on `{prefix}/{namespace}/rx` for packets
//! the notification server forwards to this namespace. Membership requests
//! (`subscribe`/`unsubscribe`) are authorized here and acknowledged on the
//! namespace's tx channel; every other event goes to the [`ClientHandler`].
//! In handshake mode the client also answers `SERVER_INIT` on `{prefix}/rx`
//! by announcing its namespace again.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use herald_core::error::{HeraldError, Result};
use herald_core::protocol::envelope::{Envelope, Ident, Rooms};
use herald_core::protocol::SERVER_INIT;

use crate::auth::{acknowledgement, CommandGuard, CommandOutcome, RoomCommand};
use crate::publisher::{AnnounceState, Publisher};
use crate::transport::SubscriberLink;

/// Callbacks for a namespace client.
#[async_trait]
pub trait ClientHandler: Send + Sync {
    /// A non-membership event addressed to this namespace.
    async fn on_message(&self, event: &str, message: Value, user: Option<Ident>) -> Result<()>;

    /// A packet could not be processed. The listener keeps running.
    fn on_error(&self, error: &HeraldError, channel: &str, packet: &[u8]) {
        tracing::warn!(
            %channel,
            code = error.code().as_str(),
            error = %error,
            packet_len = packet.len(),
            "namespace client dropped packet"
        );
    }
}

pub struct NamespaceClient {
    publisher: Arc<Publisher>,
    handler: Arc<dyn ClientHandler>,
    guard: Option<CommandGuard>,
}

impl NamespaceClient {
    pub fn new(publisher: Publisher, handler: Arc<dyn ClientHandler>) -> Self {
        Self {
            publisher: Arc::new(publisher),
            handler,
            guard: None,
        }
    }

    /// Require a verified token on membership requests.
    pub fn with_guard(mut self, guard: CommandGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Subscribe, announce (handshake mode), and start listening.
    pub async fn start(self) -> Result<ClientHandle> {
        let channels = self.publisher.channels().clone();
        let namespace = self.publisher.namespace().to_owned();
        let handshake = self.publisher.announce_state().await != AnnounceState::Disabled;

        let mut link = self.publisher.transport().open_link().await?;
        link.subscribe(&channels.data_rx(&namespace)).await?;
        if handshake {
            link.subscribe(&channels.control_rx()).await?;
            self.publisher.reannounce().await?;
        }
        tracing::info!(
            %namespace,
            prefix = %channels.prefix(),
            handshake,
            "namespace client listening"
        );

        let publisher = Arc::clone(&self.publisher);
        let task = tokio::spawn(self.listen(link));
        Ok(ClientHandle { publisher, task })
    }

    async fn listen(self, mut link: Box<dyn SubscriberLink>) -> Result<()> {
        let channels = self.publisher.channels().clone();
        let data_rx = channels.data_rx(self.publisher.namespace());
        let control_rx = channels.control_rx();

        while let Some(msg) = link.next_message().await {
            if msg.channel == control_rx {
                if msg.payload.as_ref() == SERVER_INIT.as_bytes() {
                    if let Err(e) = self.publisher.reannounce().await {
                        self.handler.on_error(&e, &msg.channel, &msg.payload);
                    }
                }
                continue;
            }
            if msg.channel != data_rx {
                continue;
            }
            if let Err(e) = self.on_packet(&msg.payload).await {
                self.handler.on_error(&e, &msg.channel, &msg.payload);
            }
        }
        tracing::warn!(namespace = %self.publisher.namespace(), "namespace client stream closed");
        Err(HeraldError::Transport("inbound stream closed".into()))
    }

    async fn on_packet(&self, payload: &[u8]) -> Result<()> {
        let env = Envelope::decode(payload)?;

        let Some(cmd) = RoomCommand::parse(&env.event) else {
            return self.handler.on_message(&env.event, env.message, env.user).await;
        };

        let ack = match &self.guard {
            Some(guard) => match guard.authorize(cmd, &env)? {
                CommandOutcome::Accepted(ack) => ack,
                CommandOutcome::Refused => return Ok(()),
            },
            None => acknowledgement(cmd, Rooms::from_value(&env.message)?, env.user.clone()),
        };
        self.publisher.emit(&ack).await
    }
}

/// Running namespace client.
pub struct ClientHandle {
    publisher: Arc<Publisher>,
    task: JoinHandle<Result<()>>,
}

impl ClientHandle {
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Send an application event (reserved names are rejected).
    pub async fn send(
        &self,
        event: &str,
        message: Value,
        rooms: Option<Rooms>,
        user: Option<Ident>,
    ) -> Result<()> {
        self.publisher.publish(event, message, rooms, user).await
    }

    pub fn shutdown(self) {
        self.task.abort();
    }

    /// Wait until the inbound stream ends (`HeraldError::Transport`).
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| HeraldError::Transport(format!("client task ended: {e}")))?
    }
}
