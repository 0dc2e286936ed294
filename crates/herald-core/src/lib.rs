//! herald core: transport-agnostic relay protocol primitives and error types.
//!
//! This crate defines the wire envelope, the channel naming scheme, and the
//! error surface shared by publishers, relays, and namespace clients. It carries
//! no transport or runtime dependencies so it can be embedded anywhere a
//! namespace needs to speak the relay protocol.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Every fallible path
//! surfaces as `HeraldError`/`Result` so a relay never crashes on hostile or
//! malformed traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, HeraldError, Result};
pub use protocol::channel::Channels;
pub use protocol::envelope::{Envelope, Ident, Rooms};
