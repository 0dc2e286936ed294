//! NATS transport adapter.
//!
//! Channel names are used verbatim as subjects (`/` is an ordinary subject
//! character, so `notif/chat/tx` is a single-token subject). Every subscription
//! gets a forwarding task that feeds the link's single inbound queue. A
//! subscription stream only ends when the client connection is gone for good,
//! which ends the link's stream as well.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use herald_core::error::{HeraldError, Result};

use super::{InboundMessage, SubscriberLink, Transport};

/// Transport backed by one `async_nats::Client`.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    pub async fn connect(url: &str, token: Option<String>) -> Result<Self> {
        let opts = match token {
            Some(token) => async_nats::ConnectOptions::with_token(token),
            None => async_nats::ConnectOptions::new(),
        };
        let client = opts
            .connect(url)
            .await
            .map_err(|e| HeraldError::Transport(format!("nats connect failed: {e}")))?;
        tracing::info!(%url, "nats transport connected");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(channel.to_owned(), payload)
            .await
            .map_err(|e| HeraldError::Transport(format!("nats publish failed: {e}")))
    }

    async fn open_link(&self) -> Result<Box<dyn SubscriberLink>> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(NatsLink {
            client: self.client.clone(),
            tx,
            rx,
            subjects: HashSet::new(),
            forwarders: Vec::new(),
        }))
    }
}

enum Forwarded {
    Message(InboundMessage),
    Ended(String),
}

struct NatsLink {
    client: async_nats::Client,
    tx: mpsc::UnboundedSender<Forwarded>,
    rx: mpsc::UnboundedReceiver<Forwarded>,
    subjects: HashSet<String>,
    forwarders: Vec<JoinHandle<()>>,
}

#[async_trait]
impl SubscriberLink for NatsLink {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        if self.subjects.contains(channel) {
            return Ok(());
        }
        let mut sub = self
            .client
            .subscribe(channel.to_owned())
            .await
            .map_err(|e| HeraldError::Transport(format!("nats subscribe failed: {e}")))?;
        self.subjects.insert(channel.to_owned());

        let tx = self.tx.clone();
        let subject = channel.to_owned();
        self.forwarders.push(tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let inbound = InboundMessage {
                    channel: msg.subject.as_str().to_owned(),
                    payload: msg.payload,
                };
                if tx.send(Forwarded::Message(inbound)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Forwarded::Ended(subject));
        }));
        Ok(())
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        match self.rx.recv().await? {
            Forwarded::Message(msg) => Some(msg),
            Forwarded::Ended(subject) => {
                tracing::warn!(%subject, "nats subscription ended");
                None
            }
        }
    }
}

impl Drop for NatsLink {
    fn drop(&mut self) {
        for f in &self.forwarders {
            f.abort();
        }
    }
}
