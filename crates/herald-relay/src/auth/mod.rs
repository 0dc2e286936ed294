//! Command authentication: token verification and the membership guard.

pub mod guard;
pub mod verifier;

pub use guard::{acknowledgement, CommandGuard, CommandOutcome, MembershipPredicate, RoomCommand};
pub use verifier::{Identity, JwtVerifier, TokenVerifier};
