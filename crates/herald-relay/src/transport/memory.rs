//! In-process pub/sub bus.
//!
//! Routes each publish to every link subscribed to the channel at that moment,
//! like a broker would: messages on channels nobody listens to are dropped.
//! Every publish and subscribe call is recorded so hosts and tests can inspect
//! traffic. `set_offline` simulates a broken connection and `close` tears the
//! bus down, ending every link's inbound stream.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use herald_core::error::{HeraldError, Result};

use super::{InboundMessage, SubscriberLink, Transport};

#[derive(Default)]
struct BusInner {
    /// Channel -> ids of the links subscribed to it.
    routes: DashMap<String, Vec<u64>>,
    /// Inbound queue of every open link. The bus holds the only sender, so
    /// dropping it here ends the link's stream.
    links: DashMap<u64, mpsc::UnboundedSender<InboundMessage>>,
    subscribe_calls: DashMap<String, usize>,
    published: Mutex<Vec<(String, Bytes)>>,
    offline: AtomicBool,
    closed: AtomicBool,
    next_link: AtomicU64,
}

impl BusInner {
    fn check_online(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(HeraldError::Transport("memory bus closed".into()));
        }
        if self.offline.load(Ordering::Relaxed) {
            return Err(HeraldError::Transport("memory bus offline".into()));
        }
        Ok(())
    }
}

/// Cloneable handle to one shared in-memory bus.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish/subscribe fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::Relaxed);
    }

    /// Shut the bus down for good. Open links drain what is already queued
    /// and then report end of stream; later calls fail with `Transport`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        self.inner.routes.clear();
        self.inner.links.clear();
    }

    /// All publishes so far, in order.
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads published on `channel`, as UTF-8 text.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(ch, _)| ch == channel)
            .map(|(_, p)| String::from_utf8_lossy(&p).into_owned())
            .collect()
    }

    /// How many times any link asked to subscribe to `channel`.
    pub fn subscribe_calls(&self, channel: &str) -> usize {
        self.inner
            .subscribe_calls
            .get(channel)
            .map(|c| *c.value())
            .unwrap_or(0)
    }

    /// Number of open links currently routed for `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .routes
            .get(channel)
            .map(|r| r.iter().filter(|id| self.inner.links.contains_key(*id)).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        self.inner.check_online()?;
        self.inner
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((channel.to_owned(), payload.clone()));

        let ids = match self.inner.routes.get(channel) {
            Some(ids) => ids.clone(),
            None => return Ok(()),
        };
        for id in ids {
            if let Some(tx) = self.inner.links.get(&id) {
                let _ = tx.send(InboundMessage {
                    channel: channel.to_owned(),
                    payload: payload.clone(),
                });
            }
        }
        Ok(())
    }

    async fn open_link(&self) -> Result<Box<dyn SubscriberLink>> {
        self.inner.check_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_link.fetch_add(1, Ordering::Relaxed);
        self.inner.links.insert(id, tx);
        Ok(Box::new(MemoryLink {
            id,
            bus: Arc::clone(&self.inner),
            rx,
            channels: HashSet::new(),
        }))
    }
}

struct MemoryLink {
    id: u64,
    bus: Arc<BusInner>,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
    channels: HashSet<String>,
}

#[async_trait]
impl SubscriberLink for MemoryLink {
    async fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.bus.check_online()?;
        *self
            .bus
            .subscribe_calls
            .entry(channel.to_owned())
            .or_insert(0) += 1;

        if self.channels.insert(channel.to_owned()) {
            self.bus
                .routes
                .entry(channel.to_owned())
                .or_default()
                .push(self.id);
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.bus.links.remove(&self.id);
        for ch in &self.channels {
            if let Some(mut routes) = self.bus.routes.get_mut(ch) {
                routes.retain(|id| *id != self.id);
            }
        }
    }
}
