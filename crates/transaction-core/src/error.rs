use thiserror::Error;

use crate::transaction::TransactionKey;
use crate::transport::TransportError;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// Error originating from the sip-core crate (URI grammar, builder).
    #[error("SIP core error: {0}")]
    SipCore(#[from] sipmesh_sip_core::Error),

    /// The transport refused or failed to send a message.
    #[error("SIP transport error: {0}")]
    Transport(#[from] TransportError),

    /// Transaction not found for the given key.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    /// Transaction with the given key already exists.
    #[error("Transaction already exists: {0}")]
    TransactionExists(TransactionKey),

    /// Invalid transaction state transition attempted.
    #[error("Invalid transaction state transition: {0}")]
    InvalidStateTransition(String),

    /// The transaction was used after it was disposed.
    #[error("Transaction {0} has been disposed")]
    Disposed(TransactionKey),

    /// A message broke a protocol rule; `status` is the response that rejects it.
    #[error("Protocol violation ({status}): {reason}")]
    ProtocolViolation { status: u16, reason: String },

    /// Internal channel error (e.g., receiver dropped).
    #[error("Internal channel closed")]
    ChannelClosed,

    /// Other miscellaneous errors.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// The status code a UAS should answer with, if this error maps to one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::ProtocolViolation { status, .. } => Some(*status),
            Error::SipCore(e) if e.is_format_error() => Some(400),
            _ => None,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
