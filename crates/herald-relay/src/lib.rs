//! herald relay library entry.
//!
//! Wires the transport seam, publisher, subscriber/relay, command
//! authentication, namespace client, config, and ops endpoints into one
//! embeddable stack. Consumed by the `herald-relay` binary and by host
//! processes that embed a relay or publisher directly.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod auth;
pub mod client;
pub mod config;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod publisher;
pub mod relay;
pub mod router;
pub mod transport;

pub use client::{ClientHandle, ClientHandler, NamespaceClient};
pub use publisher::{AnnounceState, Publisher};
pub use relay::{Delivery, NotificationHandler, Relay, RelayHandle, RelayState};
