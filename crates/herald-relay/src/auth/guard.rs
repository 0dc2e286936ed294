//! Room-membership sub-protocol.
//!
//! `subscribe`/`unsubscribe` requests carry the rooms in `m`, the peer handle
//! in `u`, and a signed token in `t`. A request is honored only when the token
//! verifies and the caller-supplied predicate agrees; the acknowledgement is
//! the same event with `m = ""`, the normalized rooms, the handle, and no token.

use std::sync::Arc;

use serde_json::Value;

use herald_core::error::{HeraldError, Result};
use herald_core::protocol::envelope::{Envelope, Ident, Rooms};

use super::verifier::{Identity, TokenVerifier};

/// Decides whether a verified identity may change membership for `handle`.
pub type MembershipPredicate =
    Arc<dyn Fn(&[Ident], &Identity, Option<&Ident>) -> bool + Send + Sync>;

/// Reserved membership events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCommand {
    Subscribe,
    Unsubscribe,
}

impl RoomCommand {
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            "subscribe" => Some(RoomCommand::Subscribe),
            "unsubscribe" => Some(RoomCommand::Unsubscribe),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoomCommand::Subscribe => "subscribe",
            RoomCommand::Unsubscribe => "unsubscribe",
        }
    }
}

/// Result of an authorized request.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Publish this acknowledgement on the namespace's data-tx channel.
    Accepted(Envelope),
    /// Predicate said no; nothing is sent.
    Refused,
}

fn allow_all(_: &[Ident], _: &Identity, _: Option<&Ident>) -> bool {
    true
}

/// Token verifier plus per-command predicates (allow-all by default).
#[derive(Clone)]
pub struct CommandGuard {
    verifier: Arc<dyn TokenVerifier>,
    on_subscribe: MembershipPredicate,
    on_unsubscribe: MembershipPredicate,
}

impl CommandGuard {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            on_subscribe: Arc::new(allow_all),
            on_unsubscribe: Arc::new(allow_all),
        }
    }

    pub fn on_subscribe<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Ident], &Identity, Option<&Ident>) -> bool + Send + Sync + 'static,
    {
        self.on_subscribe = Arc::new(f);
        self
    }

    pub fn on_unsubscribe<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Ident], &Identity, Option<&Ident>) -> bool + Send + Sync + 'static,
    {
        self.on_unsubscribe = Arc::new(f);
        self
    }

    /// Verify and evaluate one membership request.
    ///
    /// Errors: `InvalidToken` (missing or rejected token), `MalformedPacket`
    /// (rooms are not strings/integers).
    pub fn authorize(&self, cmd: RoomCommand, env: &Envelope) -> Result<CommandOutcome> {
        let token = env
            .token
            .as_deref()
            .ok_or_else(|| HeraldError::InvalidToken("missing token".into()))?;
        let identity = self.verifier.verify(token)?;
        let rooms = Rooms::from_value(&env.message)?;
        let handle = env.user.as_ref();

        let allowed = match cmd {
            RoomCommand::Subscribe => (self.on_subscribe)(&rooms, &identity, handle),
            RoomCommand::Unsubscribe => (self.on_unsubscribe)(&rooms, &identity, handle),
        };
        if !allowed {
            tracing::debug!(
                event = cmd.as_str(),
                sub = ?identity.subject(),
                "membership change refused"
            );
            return Ok(CommandOutcome::Refused);
        }

        Ok(CommandOutcome::Accepted(acknowledgement(cmd, rooms, env.user.clone())))
    }
}

/// Build the echo that confirms a membership change for `handle`.
pub fn acknowledgement(cmd: RoomCommand, rooms: Vec<Ident>, handle: Option<Ident>) -> Envelope {
    let mut ack = Envelope::new(cmd.as_str(), Value::String(String::new())).with_rooms(rooms);
    ack.user = handle;
    ack
}
