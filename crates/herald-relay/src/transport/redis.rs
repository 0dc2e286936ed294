//! Redis pub/sub transport adapter.
//!
//! Publishes go through a `ConnectionManager` (`PUBLISH`, reconnecting on
//! failure). Each link owns a dedicated connection in subscriber mode, driven
//! by one task that interleaves `SUBSCRIBE` requests with message reads.
//! Channel names are used verbatim, so this interoperates with any peer
//! speaking the same `{prefix}/{namespace}/{tx|rx}` channels on Redis.

use std::collections::HashSet;

use ::redis::aio::{ConnectionManager, PubSub};
use ::redis::{AsyncCommands, Client, Msg};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use herald_core::error::{HeraldError, Result};

use super::{InboundMessage, SubscriberLink, Transport};

fn transport_err(what: &str, e: ::redis::RedisError) -> HeraldError {
    HeraldError::Transport(format!("redis {what} failed: {e}"))
}

/// Transport backed by one Redis server.
#[derive(Clone)]
pub struct RedisTransport {
    client: Client,
    conn: ConnectionManager,
}

impl RedisTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| transport_err("client", e))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| transport_err("connect", e))?;
        tracing::info!(%url, "redis transport connected");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn
            .publish(channel, &payload[..])
            .await
            .map_err(|e| transport_err("publish", e))?;
        Ok(())
    }

    async fn open_link(&self) -> Result<Box<dyn SubscriberLink>> {
        let pubsub = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| transport_err("subscriber connect", e))?
            .into_pubsub();
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(pubsub, request_rx, tx));
        Ok(Box::new(RedisLink {
            requests,
            rx,
            channels: HashSet::new(),
            driver,
        }))
    }
}

type SubscribeRequest = (String, oneshot::Sender<Result<()>>);

struct RedisLink {
    requests: mpsc::UnboundedSender<SubscribeRequest>,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    channels: HashSet<String>,
    driver: JoinHandle<()>,
}

#[async_trait]
impl SubscriberLink for RedisLink {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        if self.channels.contains(channel) {
            return Ok(());
        }
        let (reply, done) = oneshot::channel();
        self.requests
            .send((channel.to_owned(), reply))
            .map_err(|_| HeraldError::Transport("redis subscriber connection closed".into()))?;
        done.await
            .map_err(|_| HeraldError::Transport("redis subscriber connection closed".into()))??;
        self.channels.insert(channel.to_owned());
        Ok(())
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

impl Drop for RedisLink {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum Step {
    Subscribe(Option<SubscribeRequest>),
    Message(Option<Msg>),
}

/// Own the subscriber connection. Ends (dropping `tx`, which ends the link's
/// stream) when the connection closes or the link goes away.
async fn drive(
    mut pubsub: PubSub,
    mut requests: mpsc::UnboundedReceiver<SubscribeRequest>,
    tx: mpsc::UnboundedSender<InboundMessage>,
) {
    loop {
        let step = {
            let messages = pubsub.on_message();
            futures_util::pin_mut!(messages);
            tokio::select! {
                req = requests.recv() => Step::Subscribe(req),
                msg = messages.next() => Step::Message(msg),
            }
        };

        match step {
            Step::Subscribe(Some((channel, reply))) => {
                let res = pubsub
                    .subscribe(channel.as_str())
                    .await
                    .map_err(|e| transport_err("subscribe", e));
                let _ = reply.send(res);
            }
            Step::Subscribe(None) => return,
            Step::Message(Some(msg)) => {
                if tx.send(inbound(&msg)).is_err() {
                    return;
                }
            }
            Step::Message(None) => {
                tracing::warn!("redis subscriber connection closed");
                return;
            }
        }
    }
}

/// Map a Redis pub/sub message onto the transport's inbound shape.
fn inbound(msg: &Msg) -> InboundMessage {
    InboundMessage {
        channel: msg.get_channel_name().to_owned(),
        payload: Bytes::copy_from_slice(msg.get_payload_bytes()),
    }
}
