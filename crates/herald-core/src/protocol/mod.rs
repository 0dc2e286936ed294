//! Relay protocol modules.
//!
//! - `envelope`: the compact JSON packet carried on every data channel.
//! - `channel`: derivation and parsing of control and data channel names.
//!
//! Parsers are panic-free: malformed input is reported as `HeraldError`
//! instead of panicking, keeping the relay resilient to hostile traffic.

pub mod channel;
pub mod envelope;

/// Control-channel payload asking running publishers to re-announce.
pub const SERVER_INIT: &str = "SERVER_INIT";

/// Event names reserved for the room-membership sub-protocol.
pub const RESERVED_EVENTS: [&str; 2] = ["subscribe", "unsubscribe"];

/// Whether `event` belongs to the room-membership sub-protocol.
pub fn is_reserved_event(event: &str) -> bool {
    RESERVED_EVENTS.contains(&event)
}
