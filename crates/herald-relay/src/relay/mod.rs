//! Subscriber/relay: namespace registration and per-namespace dispatch.

mod handler;
mod registry;
mod runtime;
mod state;

pub use handler::{Delivery, LogHandler, NotificationHandler};
pub use registry::NamespaceRegistry;
pub use runtime::{Relay, RelayHandle, RelayStatus};
pub use state::{RelayState, StateCell};
