//! # sipmesh-transaction-core
//!
//! The SIP transaction layer of RFC 3261 Section 17:
//!
//! - [`server`]: INVITE and non-INVITE server transactions (Timers G, H, I, J)
//! - [`client`]: INVITE and non-INVITE client transactions (Timers A, B, D, E, F, K, M)
//! - [`dialog`]: dialogs keyed by Call-ID and tags
//! - [`registry`]: [`TransactionRegistry`], which matches inbound messages to
//!   dialogs and transactions and rejects what it cannot handle
//! - [`message`]: the request/response model and start-line/header-line parsing
//!
//! Networking stays outside: the registry sends through an injected [`Transport`]
//! and is fed inbound packets through
//! [`TransactionRegistry::on_packet_received`]. Everything it has to tell the
//! transaction user arrives as a [`TransactionEvent`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use sipmesh_transaction_core::prelude::*;
//!
//! # #[derive(Debug)] struct Udp;
//! # #[async_trait::async_trait]
//! # impl Transport for Udp {
//! #     async fn send(&self, _: &Message) -> Result<(), TransportError> { Ok(()) }
//! # }
//! # async fn run() {
//! let (registry, mut events) = TransactionRegistry::new(Arc::new(Udp), TransactionConfig::default());
//! while let Some(event) = events.recv().await {
//!     if let TransactionEvent::NewRequest { key: Some(key), request, .. } = event {
//!         let ok = Response::from_request(&request, StatusCode::OK);
//!         let _ = registry.send_response(&key, ok).await;
//!     }
//! }
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dialog;
pub mod error;
pub mod message;
pub mod registry;
pub mod server;
pub mod timer;
pub mod transaction;
pub mod transport;

pub use client::{ClientTransaction, InviteClientTransaction, NonInviteClientTransaction};
pub use config::TransactionConfig;
pub use dialog::{Dialog, DialogId, DialogState};
pub use error::{Error, Result};
pub use message::{Message, Method, Request, Response, StatusCode};
pub use registry::TransactionRegistry;
pub use server::{InviteServerTransaction, NoneInviteServerTransaction, ServerTransaction};
pub use timer::{TimerSettings, TimerType};
pub use transaction::{
    ClientTransactionState, InviteServerTransactionState, NoneInviteServerTransactionState,
    SendInterceptor, Transaction, TransactionEvent, TransactionKey, TransactionState,
};
pub use transport::{Transport, TransportError, TransportType};

/// Commonly used types.
pub mod prelude {
    pub use crate::client::{ClientTransaction, InviteClientTransaction, NonInviteClientTransaction};
    pub use crate::config::TransactionConfig;
    pub use crate::dialog::{Dialog, DialogId, DialogState};
    pub use crate::error::Error;
    pub use crate::message::{
        CSeq, Message, Method, NameAddr, Request, Response, ResponseClass, StatusCode, Via,
    };
    pub use crate::registry::TransactionRegistry;
    pub use crate::server::{InviteServerTransaction, NoneInviteServerTransaction, ServerTransaction};
    pub use crate::timer::{TimerSettings, TimerType};
    pub use crate::transaction::{
        ClientTransactionState, InviteServerTransactionState, NoneInviteServerTransactionState,
        SendInterceptor, Transaction, TransactionEvent, TransactionKey, TransactionState,
    };
    pub use crate::transport::{Transport, TransportError, TransportType};
}
