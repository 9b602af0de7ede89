use std::fmt;
use std::net::SocketAddr;

use crate::dialog::DialogId;
use crate::message::{Request, Response};
use crate::timer::TimerType;
use crate::transport::{TransportError, TransportType};

use super::key::TransactionKey;
use super::state::TransactionState;

/// Notifications from transactions and the registry to the transaction user.
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    StateChanged {
        key: TransactionKey,
        previous: TransactionState,
        current: TransactionState,
    },

    /// A client transaction received a response the TU must see.
    ResponseReceived { key: TransactionKey, response: Response },

    /// A timeout timer (B, F or H) fired.
    TimedOut { key: TransactionKey, timer: TimerType },

    /// Sending failed; the transaction terminates.
    TransportError { key: TransactionKey, error: TransportError },

    Terminated { key: TransactionKey },

    /// A request that matched no dialog or transaction. `key` is the server
    /// transaction created for it; an unmatched ACK has none.
    NewRequest {
        key: Option<TransactionKey>,
        request: Request,
        source: SocketAddr,
        transport: TransportType,
    },

    /// A request that matched an existing dialog.
    DialogRequest {
        dialog: DialogId,
        key: Option<TransactionKey>,
        request: Request,
        source: SocketAddr,
    },

    /// A response that matched no client transaction.
    StrayResponse { response: Response, source: SocketAddr },
}

impl TransactionEvent {
    /// Key of the transaction the event concerns, if any.
    pub fn key(&self) -> Option<&TransactionKey> {
        match self {
            TransactionEvent::StateChanged { key, .. }
            | TransactionEvent::ResponseReceived { key, .. }
            | TransactionEvent::TimedOut { key, .. }
            | TransactionEvent::TransportError { key, .. }
            | TransactionEvent::Terminated { key } => Some(key),
            TransactionEvent::NewRequest { key, .. } | TransactionEvent::DialogRequest { key, .. } => key.as_ref(),
            TransactionEvent::StrayResponse { .. } => None,
        }
    }
}

/// Hook around the error-response path of server transactions.
///
/// Redirect and failure responses are announced before they go out; returning
/// `false` from [`before_send`](Self::before_send) cancels the send and leaves the
/// transaction where it was.
pub trait SendInterceptor: Send + Sync + fmt::Debug {
    fn before_send(&self, _key: &TransactionKey, _response: &Response) -> bool {
        true
    }

    fn after_send(&self, _key: &TransactionKey, _response: &Response) {}
}

/// Interceptor that lets everything through.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl SendInterceptor for PassThrough {}
