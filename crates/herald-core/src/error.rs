//! Shared error type across herald crates.

use thiserror::Error;

/// Stable error codes (used in logs, metrics labels, and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Inbound payload could not be decoded.
    MalformedPacket,
    /// Command token failed verification.
    InvalidToken,
    /// Caller tried to publish a reserved event.
    ReservedEventName,
    /// Namespace identifier cannot be used in a channel name.
    InvalidNamespace,
    /// Underlying pub/sub connection failed.
    Transport,
    /// Invalid configuration.
    Config,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Handler returned an error or panicked.
    Handler,
}

impl ErrorCode {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedPacket => "MALFORMED_PACKET",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::ReservedEventName => "RESERVED_EVENT_NAME",
            ErrorCode::InvalidNamespace => "INVALID_NAMESPACE",
            ErrorCode::Transport => "TRANSPORT_ERROR",
            ErrorCode::Config => "CONFIG_ERROR",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Handler => "HANDLER_ERROR",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, HeraldError>;

/// Unified error type used by core and relay.
#[derive(Debug, Error)]
pub enum HeraldError {
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("the \"{0}\" event cannot be published directly")]
    ReservedEventName(String),
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("config: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("handler: {0}")]
    Handler(String),
}

impl HeraldError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            HeraldError::MalformedPacket(_) => ErrorCode::MalformedPacket,
            HeraldError::InvalidToken(_) => ErrorCode::InvalidToken,
            HeraldError::ReservedEventName(_) => ErrorCode::ReservedEventName,
            HeraldError::InvalidNamespace(_) => ErrorCode::InvalidNamespace,
            HeraldError::Transport(_) => ErrorCode::Transport,
            HeraldError::Config(_) => ErrorCode::Config,
            HeraldError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            HeraldError::Handler(_) => ErrorCode::Handler,
        }
    }
}
