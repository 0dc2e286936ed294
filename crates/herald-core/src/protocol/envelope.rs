//! Envelope codec (JSON).
//!
//! Wire form: `{"e": event, "m": message, "r"?: rooms, "u"?: user, "t"?: token}`.
//! `r` is omitted when empty and `u`/`t` when absent, keeping payloads small.
//! Decoding restores the defaults (`rooms = []`, `user = None`) and ignores
//! unknown keys.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HeraldError, Result};

/// Room or user identifier: a string or an integer on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ident {
    Int(i64),
    Str(String),
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ident::Int(n) => write!(f, "{n}"),
            Ident::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::Str(s.to_owned())
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Ident::Str(s)
    }
}

impl From<i64> for Ident {
    fn from(n: i64) -> Self {
        Ident::Int(n)
    }
}

/// Room selector as accepted from callers and peers: one room or a list.
///
/// Always normalized to a sequence before it reaches an `Envelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rooms {
    Many(Vec<Ident>),
    One(Ident),
}

impl Rooms {
    /// Normalize into a sequence (a singleton is wrapped).
    pub fn into_vec(self) -> Vec<Ident> {
        match self {
            Rooms::Many(v) => v,
            Rooms::One(r) => vec![r],
        }
    }

    /// Interpret an arbitrary JSON value as a room selector.
    ///
    /// Used for `subscribe`/`unsubscribe` commands whose `m` carries the rooms.
    pub fn from_value(value: &Value) -> Result<Vec<Ident>> {
        Rooms::deserialize(value)
            .map(Rooms::into_vec)
            .map_err(|e| HeraldError::MalformedPacket(format!("invalid room list: {e}")))
    }
}

impl From<Vec<Ident>> for Rooms {
    fn from(v: Vec<Ident>) -> Self {
        Rooms::Many(v)
    }
}

impl From<Ident> for Rooms {
    fn from(r: Ident) -> Self {
        Rooms::One(r)
    }
}

impl From<&str> for Rooms {
    fn from(s: &str) -> Self {
        Rooms::One(Ident::from(s))
    }
}

impl From<i64> for Rooms {
    fn from(n: i64) -> Self {
        Rooms::One(Ident::Int(n))
    }
}

impl<I: Into<Ident>> FromIterator<I> for Rooms {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Rooms::Many(iter.into_iter().map(Into::into).collect())
    }
}

/// Decoded relay packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Event name (`e`).
    pub event: String,
    /// Arbitrary payload (`m`).
    pub message: Value,
    /// Target rooms (`r`), empty when absent.
    pub rooms: Vec<Ident>,
    /// User or handle (`u`).
    pub user: Option<Ident>,
    /// Signed command token (`t`), only carried by membership requests.
    pub token: Option<String>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, message: Value) -> Self {
        Self {
            event: event.into(),
            message,
            rooms: Vec::new(),
            user: None,
            token: None,
        }
    }

    pub fn with_rooms(mut self, rooms: impl Into<Rooms>) -> Self {
        self.rooms = rooms.into().into_vec();
        self
    }

    pub fn with_user(mut self, user: impl Into<Ident>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Serialize to the compact wire string.
    pub fn encode(&self) -> Result<String> {
        let wire = WireOut {
            e: &self.event,
            m: &self.message,
            r: &self.rooms,
            u: self.user.as_ref(),
            t: self.token.as_deref(),
        };
        serde_json::to_string(&wire)
            .map_err(|e| HeraldError::MalformedPacket(format!("json encode failed: {e}")))
    }

    /// Serialize straight into a transport payload.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.encode().map(Bytes::from)
    }

    /// Parse a wire payload and apply defaults.
    pub fn decode(wire: &[u8]) -> Result<Self> {
        let w: WireIn = serde_json::from_slice(wire)
            .map_err(|e| HeraldError::MalformedPacket(format!("invalid envelope json: {e}")))?;
        Ok(Self {
            event: w.e,
            message: w.m,
            rooms: w.r.map(Rooms::into_vec).unwrap_or_default(),
            user: w.u,
            token: w.t,
        })
    }
}

/// Encode an event without building an `Envelope` first.
pub fn encode(
    event: &str,
    message: Value,
    rooms: Option<Rooms>,
    user: Option<Ident>,
) -> Result<String> {
    let mut env = Envelope::new(event, message);
    if let Some(r) = rooms {
        env.rooms = r.into_vec();
    }
    env.user = user;
    env.encode()
}

/// Decode a wire string.
pub fn decode(wire: &str) -> Result<Envelope> {
    Envelope::decode(wire.as_bytes())
}

#[derive(Serialize)]
struct WireOut<'a> {
    e: &'a str,
    m: &'a Value,
    #[serde(skip_serializing_if = "no_rooms")]
    r: &'a [Ident],
    #[serde(skip_serializing_if = "Option::is_none")]
    u: Option<&'a Ident>,
    #[serde(skip_serializing_if = "Option::is_none")]
    t: Option<&'a str>,
}

fn no_rooms(r: &&[Ident]) -> bool {
    r.is_empty()
}

#[derive(Deserialize)]
struct WireIn {
    e: String,
    m: Value,
    #[serde(default)]
    r: Option<Rooms>,
    #[serde(default)]
    u: Option<Ident>,
    #[serde(default)]
    t: Option<String>,
}
