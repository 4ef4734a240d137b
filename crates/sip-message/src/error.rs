//! Error types for the message model

use thiserror::Error;

/// Errors raised while interpreting message fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// A transport token that is not UDP, TCP, TLS, SCTP, WS or WSS
    #[error("unknown transport: {0}")]
    UnknownTransport(String),

    /// A URI that could not be reduced to a host and port
    #[error("invalid SIP URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: &'static str },
}

/// Result alias for message operations
pub type Result<T> = std::result::Result<T, MessageError>;
