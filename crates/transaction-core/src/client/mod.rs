//! Client transactions.

mod invite;
mod non_invite;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use invite::{create_ack, InviteClientTransaction};
pub use non_invite::NonInviteClientTransaction;

use crate::error::Result;
use crate::message::{Method, Request, Response};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::{Transaction, TransactionEvent, TransactionKey, TransactionState};
use crate::transport::{Transport, TransportType};

/// Either kind of client transaction.
#[derive(Debug, Clone)]
pub enum ClientTransaction {
    Invite(InviteClientTransaction),
    NonInvite(NonInviteClientTransaction),
}

impl ClientTransaction {
    /// Creates the transaction kind matching the request method. Call
    /// [`start`](Self::start) to send the request.
    pub fn new(
        key: TransactionKey,
        request: Request,
        transport: Arc<dyn Transport>,
        transport_type: TransportType,
        settings: TimerSettings,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        if request.method.is_invite() {
            ClientTransaction::Invite(InviteClientTransaction::new(
                key,
                request,
                transport,
                transport_type,
                settings,
                events,
            ))
        } else {
            ClientTransaction::NonInvite(NonInviteClientTransaction::new(
                key,
                request,
                transport,
                transport_type,
                settings,
                events,
            ))
        }
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, ClientTransaction::Invite(_))
    }

    pub async fn start(&self) -> Result<()> {
        match self {
            ClientTransaction::Invite(tx) => tx.start().await,
            ClientTransaction::NonInvite(tx) => tx.start().await,
        }
    }

    pub async fn process_response(&self, response: Response) -> Result<()> {
        match self {
            ClientTransaction::Invite(tx) => tx.process_response(response).await,
            ClientTransaction::NonInvite(tx) => tx.process_response(response).await,
        }
    }

    pub async fn original_request(&self) -> Request {
        match self {
            ClientTransaction::Invite(tx) => tx.original_request().await,
            ClientTransaction::NonInvite(tx) => tx.original_request().await,
        }
    }

    pub async fn last_response(&self) -> Option<Response> {
        match self {
            ClientTransaction::Invite(tx) => tx.last_response().await,
            ClientTransaction::NonInvite(tx) => tx.last_response().await,
        }
    }

    pub async fn fire_timer(&self, timer: TimerType) {
        match self {
            ClientTransaction::Invite(tx) => tx.fire_timer(timer).await,
            ClientTransaction::NonInvite(tx) => tx.fire_timer(timer).await,
        }
    }
}

#[async_trait]
impl Transaction for ClientTransaction {
    fn key(&self) -> &TransactionKey {
        match self {
            ClientTransaction::Invite(tx) => tx.key(),
            ClientTransaction::NonInvite(tx) => tx.key(),
        }
    }

    fn method(&self) -> &Method {
        match self {
            ClientTransaction::Invite(tx) => tx.method(),
            ClientTransaction::NonInvite(tx) => tx.method(),
        }
    }

    fn state(&self) -> TransactionState {
        match self {
            ClientTransaction::Invite(tx) => tx.state().into(),
            ClientTransaction::NonInvite(tx) => tx.state().into(),
        }
    }

    async fn terminate(&self) {
        match self {
            ClientTransaction::Invite(tx) => tx.terminate().await,
            ClientTransaction::NonInvite(tx) => tx.terminate().await,
        }
    }

    fn dispose(&self) {
        match self {
            ClientTransaction::Invite(tx) => tx.dispose(),
            ClientTransaction::NonInvite(tx) => tx.dispose(),
        }
    }
}
