//! Registration policy.
//!
//! Handshake mode lets any peer announce a namespace; the allowlist bounds
//! which announcements the relay will turn into subscriptions.

pub mod allowlist;

pub use allowlist::NamespaceAllowlist;
