//! The seam between transactions and the network.
//!
//! Socket I/O lives outside this crate. Transactions only need something that can
//! send a [`Message`]; inbound packets are pushed into
//! [`TransactionRegistry::on_packet_received`](crate::registry::TransactionRegistry::on_packet_received).

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// Failure reported by a [`Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("failed to send message: {0}")]
    SendFailed(String),

    #[error("no route to destination: {0}")]
    Unreachable(String),
}

/// Transport protocol a message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    Udp,
    Tcp,
    Tls,
    Ws,
}

impl TransportType {
    /// Reliable transports retransmit on their own, so the transaction layer
    /// does not (RFC 3261 Section 17).
    pub fn is_reliable(&self) -> bool {
        !matches!(self, TransportType::Udp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Udp => "UDP",
            TransportType::Tcp => "TCP",
            TransportType::Tls => "TLS",
            TransportType::Ws => "WS",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(TransportType::Udp),
            "TCP" => Ok(TransportType::Tcp),
            "TLS" => Ok(TransportType::Tls),
            "WS" | "WSS" => Ok(TransportType::Ws),
            other => Err(TransportError::Unreachable(format!("unknown transport {}", other))),
        }
    }
}

/// Sends SIP messages on behalf of the transaction layer.
///
/// Sending is fire-and-forget from a transaction's point of view: an error is turned
/// into a transport-error event and terminates the transaction.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, message: &Message) -> Result<(), TransportError>;
}
