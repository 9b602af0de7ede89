//! Server transactions.

mod invite;
mod non_invite;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use invite::InviteServerTransaction;
pub use non_invite::NoneInviteServerTransaction;

use crate::error::Result;
use crate::message::{Method, Request, Response};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{
    SendInterceptor, Transaction, TransactionEvent, TransactionKey, TransactionState,
};
use crate::transport::{Transport, TransportType};

/// Either kind of server transaction.
#[derive(Debug, Clone)]
pub enum ServerTransaction {
    Invite(InviteServerTransaction),
    NonInvite(NoneInviteServerTransaction),
}

impl ServerTransaction {
    /// Creates the transaction kind matching `method`.
    pub fn new(
        key: TransactionKey,
        method: &Method,
        transport: Arc<dyn Transport>,
        transport_type: TransportType,
        settings: TimerSettings,
        interceptor: Arc<dyn SendInterceptor>,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        if method.is_invite() {
            ServerTransaction::Invite(InviteServerTransaction::new(
                key,
                transport,
                transport_type,
                settings,
                interceptor,
                events,
            ))
        } else {
            ServerTransaction::NonInvite(NoneInviteServerTransaction::new(
                key,
                method.clone(),
                transport,
                transport_type,
                settings,
                interceptor,
                events,
            ))
        }
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, ServerTransaction::Invite(_))
    }

    /// Whether a request with `method` may be handled by this transaction.
    /// An INVITE transaction also takes its ACK.
    pub fn accepts_method(&self, method: &Method) -> bool {
        match self {
            ServerTransaction::Invite(_) => matches!(method, Method::Invite | Method::Ack),
            ServerTransaction::NonInvite(tx) => tx.method() == method,
        }
    }

    pub async fn process_request(&self, request: Request) -> Result<()> {
        match self {
            ServerTransaction::Invite(tx) => tx.process_request(request).await,
            ServerTransaction::NonInvite(tx) => tx.process_request(request).await,
        }
    }

    pub async fn send_response(&self, response: Response) -> Result<()> {
        match self {
            ServerTransaction::Invite(tx) => tx.send_response(response).await,
            ServerTransaction::NonInvite(tx) => tx.send_response(response).await,
        }
    }

    pub async fn original_request(&self) -> Option<Request> {
        match self {
            ServerTransaction::Invite(tx) => tx.original_request().await,
            ServerTransaction::NonInvite(tx) => tx.original_request().await,
        }
    }

    pub async fn last_response(&self) -> Option<Response> {
        match self {
            ServerTransaction::Invite(tx) => tx.last_response().await,
            ServerTransaction::NonInvite(tx) => tx.last_response().await,
        }
    }

    pub async fn fire_timer(&self, timer: TimerType) {
        match self {
            ServerTransaction::Invite(tx) => tx.fire_timer(timer).await,
            ServerTransaction::NonInvite(tx) => tx.fire_timer(timer).await,
        }
    }
}

#[async_trait]
impl Transaction for ServerTransaction {
    fn key(&self) -> &TransactionKey {
        match self {
            ServerTransaction::Invite(tx) => tx.key(),
            ServerTransaction::NonInvite(tx) => tx.key(),
        }
    }

    fn method(&self) -> &Method {
        match self {
            ServerTransaction::Invite(tx) => tx.method(),
            ServerTransaction::NonInvite(tx) => tx.method(),
        }
    }

    fn state(&self) -> TransactionState {
        match self {
            ServerTransaction::Invite(tx) => tx.state().into(),
            ServerTransaction::NonInvite(tx) => tx.state().into(),
        }
    }

    async fn terminate(&self) {
        match self {
            ServerTransaction::Invite(tx) => tx.terminate().await,
            ServerTransaction::NonInvite(tx) => tx.terminate().await,
        }
    }

    fn dispose(&self) {
        match self {
            ServerTransaction::Invite(tx) => tx.dispose(),
            ServerTransaction::NonInvite(tx) => tx.dispose(),
        }
    }
}

impl From<InviteServerTransaction> for ServerTransaction {
    fn from(tx: InviteServerTransaction) -> Self {
        ServerTransaction::Invite(tx)
    }
}

impl From<NoneInviteServerTransaction> for ServerTransaction {
    fn from(tx: NoneInviteServerTransaction) -> Self {
        ServerTransaction::NonInvite(tx)
    }
}
