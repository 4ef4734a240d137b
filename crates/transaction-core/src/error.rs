//! # Error types for the transaction layer
//!
//! Two families of errors exist:
//!
//! - [`Error`] is returned synchronously from layer operations (creation,
//!   dispatch, callback registration, configuration).
//! - [`TransportError`] never travels up a call stack. It is handed to the
//!   transport-error callback of the affected transaction, after which the
//!   transaction is terminated.
//!
//! An event that matches no transaction is not an error: see
//! [`Dispatch::Unmatched`](crate::Dispatch::Unmatched).

use thiserror::Error;

use crate::transaction::TransactionKind;

/// A type alias for handling `Result`s with [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by transaction layer operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The message is malformed for transaction purposes (missing mandatory
    /// header, CSeq/method mismatch, ACK or response offered for creation).
    /// The event is discarded.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A callback was registered with an index outside its family's range
    #[error("invalid {family} callback type: {index}")]
    InvalidCallbackType { family: &'static str, index: usize },

    /// Timer or layer settings that cannot be used
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A transaction was offered to the table of another kind
    #[error("cannot store a {actual:?} transaction in the {expected:?} table")]
    WrongTable {
        expected: TransactionKind,
        actual: TransactionKind,
    },

    /// Creation or initialization could not complete; nothing was registered
    #[error("allocation failure: {0}")]
    AllocationFailure(String),
}

impl Error {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Error::Validation(reason.into())
    }
}

/// Failures reported through the transport-error callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The registered transport refused or failed to send the message
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No transport has been registered on the layer
    #[error("no transport registered")]
    NoTransport,

    /// The transaction has no destination to send to
    #[error("transaction has no destination")]
    NoDestination,

    /// Timer H fired before the ACK for a non-2xx final response arrived
    #[error("timer H expired before ACK was received")]
    AckTimeout,
}
