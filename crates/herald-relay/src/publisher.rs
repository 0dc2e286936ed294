//! Application-facing publisher for one namespace.
//!
//! Each publish emits one envelope on `{prefix}/{namespace}/tx`. In handshake
//! mode the first successful publish is preceded by the bare namespace on
//! `{prefix}/tx` so a handshake-mode relay can discover it. The announcement
//! is one-shot per instance: after a transport-level reconnect, build a new
//! `Publisher` to announce again.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Mutex;

use herald_core::error::{HeraldError, Result};
use herald_core::protocol::channel::Channels;
use herald_core::protocol::envelope::{Envelope, Ident, Rooms};
use herald_core::protocol::is_reserved_event;

use crate::config::PublisherSettings;
use crate::transport::Transport;

/// Announcement progress. Monotonic: `NotAnnounced -> Announced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceState {
    /// Handshake mode is off; nothing is ever announced.
    Disabled,
    NotAnnounced,
    Announced,
}

pub struct Publisher {
    namespace: String,
    channels: Channels,
    data_tx: String,
    transport: Arc<dyn Transport>,
    announce: Mutex<AnnounceState>,
}

impl Publisher {
    pub fn new(settings: PublisherSettings, transport: Arc<dyn Transport>) -> Result<Self> {
        settings.validate()?;
        let channels = Channels::new(settings.prefix)?;
        let data_tx = channels.data_tx(&settings.namespace);
        let announce = if settings.handshake {
            AnnounceState::NotAnnounced
        } else {
            AnnounceState::Disabled
        };
        Ok(Self {
            namespace: settings.namespace,
            channels,
            data_tx,
            transport,
            announce: Mutex::new(announce),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn announce_state(&self) -> AnnounceState {
        *self.announce.lock().await
    }

    /// Publish an application event.
    ///
    /// `subscribe`/`unsubscribe` are rejected with `ReservedEventName` before
    /// any transport I/O happens.
    pub async fn publish(
        &self,
        event: &str,
        message: Value,
        rooms: Option<Rooms>,
        user: Option<Ident>,
    ) -> Result<()> {
        if is_reserved_event(event) {
            return Err(HeraldError::ReservedEventName(event.to_owned()));
        }
        let mut env = Envelope::new(event, message);
        if let Some(rooms) = rooms {
            env.rooms = rooms.into_vec();
        }
        env.user = user;
        self.emit(&env).await
    }

    /// Publish a prepared envelope without the reserved-name check.
    pub(crate) async fn emit(&self, env: &Envelope) -> Result<()> {
        let payload = env.to_bytes()?;
        self.ensure_announced().await?;
        self.transport.publish(&self.data_tx, payload).await?;
        tracing::debug!(namespace = %self.namespace, event = %env.event, "published");
        Ok(())
    }

    /// Announce again regardless of state (reply to `SERVER_INIT`).
    pub async fn reannounce(&self) -> Result<()> {
        let mut state = self.announce.lock().await;
        self.send_announce().await?;
        if *state == AnnounceState::NotAnnounced {
            *state = AnnounceState::Announced;
        }
        Ok(())
    }

    async fn ensure_announced(&self) -> Result<()> {
        let mut state = self.announce.lock().await;
        if *state == AnnounceState::NotAnnounced {
            self.send_announce().await?;
            *state = AnnounceState::Announced;
        }
        Ok(())
    }

    async fn send_announce(&self) -> Result<()> {
        let channel = self.channels.control_tx();
        self.transport
            .publish(&channel, Bytes::from(self.namespace.clone()))
            .await?;
        tracing::info!(namespace = %self.namespace, %channel, "announced namespace");
        Ok(())
    }
}
