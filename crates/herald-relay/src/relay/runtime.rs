//! Subscriber/relay state machine.
//!
//! `start()` moves `Unstarted -> Subscribing -> Listening`:
//! - static mode subscribes every configured namespace's data-tx channel;
//! - handshake mode subscribes the control-tx channel and publishes
//!   `SERVER_INIT` on control-rx so running publishers announce again.
//!
//! The listening task then reads the link one message at a time. Control-tx
//! payloads register namespaces (idempotently); data-tx payloads of registered
//! namespaces are decoded and handed to the handler; anything else is ignored.
//! A failure while processing one message is logged and never ends the loop.
//!
//! With a guard configured every `subscribe`/`unsubscribe` on a data channel
//! must carry a verifiable token. Accepted requests are echoed on the data-tx
//! channel and delivered to the handler directly; the relay's own echo read
//! back from the transport is recognized and skipped.
//!
//! The registration table is only written by the listening task, so handshake
//! registrations are naturally serialized against dispatch. In `spawned`
//! dispatch mode handlers run on their own tasks and may overlap.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use herald_core::error::{HeraldError, Result};
use herald_core::protocol::channel::{validate_namespace, Channels};
use herald_core::protocol::envelope::Envelope;
use herald_core::protocol::SERVER_INIT;

use crate::auth::{CommandGuard, CommandOutcome, RoomCommand};
use crate::config::{DispatchMode, RegistrationMode, RelaySection};
use crate::obs::RelayMetrics;
use crate::policy::NamespaceAllowlist;
use crate::transport::{InboundMessage, SubscriberLink, Transport};

use super::handler::{Delivery, NotificationHandler};
use super::registry::NamespaceRegistry;
use super::state::{RelayState, StateCell};

type Link = Box<dyn SubscriberLink>;

/// Shared view of a relay's observable state.
#[derive(Clone)]
pub struct RelayStatus {
    pub state: Arc<StateCell>,
    pub registry: Arc<NamespaceRegistry>,
    pub metrics: Arc<RelayMetrics>,
}

impl RelayStatus {
    pub fn state(&self) -> RelayState {
        self.state.get()
    }
}

struct RelayCore {
    channels: Channels,
    mode: RegistrationMode,
    dispatch: DispatchMode,
    static_namespaces: Vec<String>,
    allowlist: NamespaceAllowlist,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn NotificationHandler>,
    guard: Option<CommandGuard>,
    status: RelayStatus,
    /// Acknowledgements this relay published and expects to read back on its
    /// own data-tx subscription, keyed by namespace and exact payload.
    own_acks: DashMap<(String, Bytes), usize>,
}

/// A relay that has not been started yet.
pub struct Relay {
    core: RelayCore,
}

impl Relay {
    pub fn new(
        settings: RelaySection,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<Self> {
        settings.validate()?;
        let channels = Channels::new(settings.prefix.clone())?;
        let allowlist = NamespaceAllowlist::compile(&settings.handshake_allowlist)?;
        let status = RelayStatus {
            state: Arc::new(StateCell::default()),
            registry: Arc::new(NamespaceRegistry::new(channels.clone())),
            metrics: Arc::new(RelayMetrics::default()),
        };
        Ok(Self {
            core: RelayCore {
                channels,
                mode: settings.mode,
                dispatch: settings.dispatch,
                static_namespaces: settings.namespaces,
                allowlist,
                transport,
                handler,
                guard: None,
                status,
                own_acks: DashMap::new(),
            },
        })
    }

    /// Authenticate `subscribe`/`unsubscribe` requests with this guard.
    ///
    /// Membership events without a token are then rejected, so peers must not
    /// also acknowledge requests themselves (e.g. a guarded `NamespaceClient`).
    pub fn with_guard(mut self, guard: CommandGuard) -> Self {
        self.core.guard = Some(guard);
        self
    }

    pub fn status(&self) -> RelayStatus {
        self.core.status.clone()
    }

    /// Issue the initial subscriptions and start listening.
    ///
    /// Transport failures during subscription propagate and leave the relay
    /// `Unstarted`.
    pub async fn start(self) -> Result<RelayHandle> {
        let core = Arc::new(self.core);
        core.status.state.set(RelayState::Subscribing);

        let link = match core.subscribe_initial().await {
            Ok(link) => link,
            Err(e) => {
                core.status.state.set(RelayState::Unstarted);
                return Err(e);
            }
        };

        core.status.state.set(RelayState::Listening);
        tracing::info!(
            prefix = %core.channels.prefix(),
            mode = ?core.mode,
            namespaces = core.status.registry.len(),
            "relay listening"
        );

        let task = tokio::spawn(Arc::clone(&core).listen(link));
        Ok(RelayHandle { core, task })
    }
}

/// Running relay.
pub struct RelayHandle {
    core: Arc<RelayCore>,
    task: JoinHandle<Result<()>>,
}

impl RelayHandle {
    pub fn state(&self) -> RelayState {
        self.core.status.state.get()
    }

    pub fn status(&self) -> RelayStatus {
        self.core.status.clone()
    }

    pub fn registry(&self) -> Arc<NamespaceRegistry> {
        Arc::clone(&self.core.status.registry)
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.core.status.metrics)
    }

    pub fn channels(&self) -> &Channels {
        &self.core.channels
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the listening task. In-flight spawned handlers keep running.
    pub fn shutdown(self) {
        self.task.abort();
        tracing::info!(prefix = %self.core.channels.prefix(), "relay shut down");
    }

    /// Wait until the inbound stream ends.
    ///
    /// A stream that ends without `shutdown()` means the transport went away
    /// and surfaces as `HeraldError::Transport`.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| HeraldError::Transport(format!("relay task ended: {e}")))?
    }
}

impl RelayCore {
    async fn subscribe_initial(&self) -> Result<Link> {
        let mut link = self.transport.open_link().await?;
        match self.mode {
            RegistrationMode::Static => {
                for ns in &self.static_namespaces {
                    self.register(&mut link, ns, "static").await?;
                }
            }
            RegistrationMode::Handshake => {
                let control = self.channels.control_tx();
                link.subscribe(&control).await?;
                let init = Bytes::from_static(SERVER_INIT.as_bytes());
                self.transport
                    .publish(&self.channels.control_rx(), init)
                    .await?;
                tracing::info!(channel = %control, "awaiting namespace announcements");
            }
        }
        Ok(link)
    }

    /// Subscribe to a namespace's data-tx channel unless already registered.
    async fn register(&self, link: &mut Link, namespace: &str, source: &str) -> Result<bool> {
        let registry = &self.status.registry;
        if registry.contains(namespace) {
            return Ok(false);
        }
        let channel = self.channels.data_tx(namespace);
        link.subscribe(&channel).await?;
        registry.insert(namespace);

        let m = &self.status.metrics;
        m.registrations.inc(&[("source", source)]);
        m.namespaces.inc(&[]);
        tracing::info!(%namespace, %channel, source, "registered namespace");
        Ok(true)
    }

    async fn listen(self: Arc<Self>, mut link: Link) -> Result<()> {
        while let Some(msg) = link.next_message().await {
            self.on_message(&mut link, msg).await;
        }
        tracing::warn!(prefix = %self.channels.prefix(), "inbound stream closed");
        Err(HeraldError::Transport("inbound stream closed".into()))
    }

    async fn on_message(self: &Arc<Self>, link: &mut Link, msg: InboundMessage) {
        let m = &self.status.metrics;

        if self.mode == RegistrationMode::Handshake && self.channels.is_control_tx(&msg.channel) {
            m.inbound.inc(&[("kind", "control")]);
            self.on_announce(link, &msg.payload).await;
            return;
        }

        let namespace = match self.channels.parse_data_channel(&msg.channel) {
            Some(ns) if self.status.registry.contains_channel(&msg.channel) => ns.to_owned(),
            _ => {
                m.inbound.inc(&[("kind", "ignored")]);
                tracing::trace!(channel = %msg.channel, "ignoring untracked channel");
                return;
            }
        };

        m.inbound.inc(&[("kind", "data")]);
        self.on_packet(namespace, msg.payload).await;
    }

    async fn on_announce(&self, link: &mut Link, payload: &[u8]) {
        let m = &self.status.metrics;
        let namespace = match std::str::from_utf8(payload) {
            Ok(s) => s,
            Err(_) => {
                m.rejected_announcements.inc(&[("reason", "invalid")]);
                tracing::warn!("announcement is not valid UTF-8");
                return;
            }
        };

        if let Err(e) = validate_namespace(namespace) {
            m.rejected_announcements.inc(&[("reason", "invalid")]);
            tracing::warn!(code = e.code().as_str(), error = %e, "rejecting announcement");
            return;
        }
        if !self.allowlist.is_allowed(namespace) {
            m.rejected_announcements.inc(&[("reason", "not_allowed")]);
            tracing::warn!(%namespace, "announcement not in handshake_allowlist");
            return;
        }

        match self.register(link, namespace, "handshake").await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(%namespace, "namespace already registered"),
            Err(e) => tracing::warn!(
                %namespace,
                code = e.code().as_str(),
                error = %e,
                "registration failed"
            ),
        }
    }

    async fn on_packet(self: &Arc<Self>, namespace: String, payload: Bytes) {
        let env = match Envelope::decode(&payload) {
            Ok(env) => env,
            Err(e) => {
                self.status
                    .metrics
                    .decode_errors
                    .inc(&[("namespace", &namespace)]);
                tracing::warn!(%namespace, code = e.code().as_str(), error = %e, "dropping packet");
                return;
            }
        };

        if let (Some(guard), Some(cmd)) = (&self.guard, RoomCommand::parse(&env.event)) {
            if self.take_own_ack(&namespace, &payload) {
                tracing::trace!(%namespace, event = cmd.as_str(), "skipping own acknowledgement");
                return;
            }
            self.on_command(guard, cmd, &namespace, &env).await;
            return;
        }

        self.deliver(Delivery::new(namespace, env)).await;
    }

    async fn on_command(
        self: &Arc<Self>,
        guard: &CommandGuard,
        cmd: RoomCommand,
        namespace: &str,
        env: &Envelope,
    ) {
        let m = &self.status.metrics;
        let event = cmd.as_str();
        let labels = |outcome: &'static str| {
            [
                ("namespace", namespace),
                ("event", event),
                ("outcome", outcome),
            ]
        };

        let ack = match guard.authorize(cmd, env) {
            Ok(CommandOutcome::Accepted(ack)) => ack,
            Ok(CommandOutcome::Refused) => {
                m.commands.inc(&labels("refused"));
                return;
            }
            Err(e) => {
                m.commands.inc(&labels("rejected"));
                tracing::warn!(
                    %namespace,
                    event,
                    code = e.code().as_str(),
                    error = %e,
                    "dropping command"
                );
                return;
            }
        };

        let sent = match ack.to_bytes() {
            Ok(payload) => self.publish_ack(namespace, payload).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => {
                m.commands.inc(&labels("accepted"));
                tracing::debug!(
                    %namespace,
                    event,
                    rooms = ack.rooms.len(),
                    "membership change acknowledged"
                );
                self.deliver(Delivery::new(namespace, ack)).await;
            }
            Err(e) => {
                m.commands.inc(&labels("failed"));
                tracing::warn!(
                    %namespace,
                    event,
                    code = e.code().as_str(),
                    error = %e,
                    "acknowledgement not sent"
                );
            }
        }
    }

    async fn publish_ack(&self, namespace: &str, payload: Bytes) -> Result<()> {
        let key = (namespace.to_owned(), payload.clone());
        *self.own_acks.entry(key.clone()).or_insert(0) += 1;

        let res = self
            .transport
            .publish(&self.channels.data_tx(namespace), payload)
            .await;
        if res.is_err() {
            self.take_own_ack(&key.0, &key.1);
        }
        res
    }

    fn take_own_ack(&self, namespace: &str, payload: &Bytes) -> bool {
        match self.own_acks.entry((namespace.to_owned(), payload.clone())) {
            Entry::Occupied(mut e) => {
                if *e.get() <= 1 {
                    e.remove();
                } else {
                    *e.get_mut() -= 1;
                }
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    async fn deliver(self: &Arc<Self>, delivery: Delivery) {
        match self.dispatch {
            DispatchMode::Sequential => self.invoke(delivery).await,
            DispatchMode::Spawned => {
                let core = Arc::clone(self);
                tokio::spawn(async move { core.invoke(delivery).await });
            }
        }
    }

    async fn invoke(&self, delivery: Delivery) {
        let m = &self.status.metrics;
        let namespace = delivery.namespace.clone();
        let event = delivery.event.clone();
        m.deliveries.inc(&[("namespace", &namespace)]);

        let started = Instant::now();
        let res = AssertUnwindSafe(self.handler.handle(delivery))
            .catch_unwind()
            .await;
        m.handler_duration
            .observe(&[("namespace", &namespace)], started.elapsed());

        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                m.handler_errors
                    .inc(&[("namespace", &namespace), ("kind", "error")]);
                tracing::warn!(
                    %namespace,
                    %event,
                    code = e.code().as_str(),
                    error = %e,
                    "handler failed"
                );
            }
            Err(_) => {
                m.handler_errors
                    .inc(&[("namespace", &namespace), ("kind", "panic")]);
                tracing::error!(%namespace, %event, "handler panicked");
            }
        }
    }
}
