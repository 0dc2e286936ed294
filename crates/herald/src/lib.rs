//! Top-level facade crate for herald.
//!
//! Re-exports the protocol core and the relay library so users can depend on a
//! single crate.

pub mod core {
    pub use herald_core::*;
}

pub mod relay {
    pub use herald_relay::*;
}
