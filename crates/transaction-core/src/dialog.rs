//! Dialogs and the transactions that belong to them.
//!
//! A dialog is identified by its Call-ID and the two tags (RFC 3261 Section 12).
//! Seen from a UAS the local tag is the To tag; seen from a UAC it is the From tag.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientTransaction;
use crate::message::{Request, Response};
use crate::server::ServerTransaction;
use crate::transaction::{Transaction, TransactionKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    pub call_id: String,
    pub local_tag: String,
    pub remote_tag: String,
}

impl DialogId {
    pub fn new(call_id: impl Into<String>, local_tag: impl Into<String>, remote_tag: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }

    /// Dialog an inbound request belongs to, seen from the UAS.
    pub fn from_incoming_request(request: &Request) -> Option<Self> {
        Some(Self::new(request.call_id()?, request.to_tag()?, request.from_tag()?))
    }

    /// Dialog an inbound response belongs to, seen from the UAC.
    pub fn from_incoming_response(response: &Response) -> Option<Self> {
        Some(Self::new(response.call_id()?, response.from_tag()?, response.to_tag()?))
    }

    /// Dialog an outbound in-dialog request belongs to, seen from the UAC.
    pub fn from_outgoing_request(request: &Request) -> Option<Self> {
        Some(Self::new(request.call_id()?, request.from_tag()?, request.to_tag()?))
    }

    /// Dialog an outbound response establishes, seen from the UAS.
    pub fn from_outgoing_response(response: &Response) -> Option<Self> {
        Some(Self::new(response.call_id()?, response.to_tag()?, response.from_tag()?))
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};local={};remote={}", self.call_id, self.local_tag, self.remote_tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogState {
    /// Created by a provisional response carrying a To tag.
    Early,
    /// Created or confirmed by a 2xx.
    Confirmed,
    Terminated,
}

/// A transaction owned by a dialog.
#[derive(Debug, Clone)]
pub enum DialogTransaction {
    Client(ClientTransaction),
    Server(ServerTransaction),
}

impl DialogTransaction {
    pub fn key(&self) -> &TransactionKey {
        match self {
            DialogTransaction::Client(tx) => tx.key(),
            DialogTransaction::Server(tx) => tx.key(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        match self {
            DialogTransaction::Client(tx) => tx.is_terminated(),
            DialogTransaction::Server(tx) => tx.is_terminated(),
        }
    }
}

#[derive(Debug)]
struct DialogInner {
    state: DialogState,
    transactions: HashMap<TransactionKey, DialogTransaction>,
}

/// A dialog and the transactions currently running inside it.
#[derive(Debug)]
pub struct Dialog {
    id: DialogId,
    inner: Mutex<DialogInner>,
}

impl Dialog {
    pub fn new(id: DialogId, state: DialogState) -> Self {
        Self {
            id,
            inner: Mutex::new(DialogInner {
                state,
                transactions: HashMap::new(),
            }),
        }
    }

    /// Creates the dialog a response to a dialog-creating request establishes:
    /// a 1xx with a To tag gives an early dialog, a 2xx a confirmed one.
    /// `is_server` selects which tag is local.
    pub fn from_response(response: &Response, is_server: bool) -> Option<Self> {
        let id = if is_server {
            DialogId::from_outgoing_response(response)?
        } else {
            DialogId::from_incoming_response(response)?
        };
        let code = response.code();
        let state = match code {
            101..=199 => DialogState::Early,
            200..=299 => DialogState::Confirmed,
            _ => return None,
        };
        Some(Self::new(id, state))
    }

    pub fn id(&self) -> &DialogId {
        &self.id
    }

    pub fn state(&self) -> DialogState {
        self.inner.lock().state
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == DialogState::Terminated
    }

    /// Applies a response on the dialog-creating transaction: 2xx confirms an early
    /// dialog, a failure response terminates it. Returns the new state.
    pub fn update_from_response(&self, response: &Response) -> DialogState {
        let mut inner = self.inner.lock();
        let next = match (inner.state, response.code()) {
            (DialogState::Early, 200..=299) => DialogState::Confirmed,
            (DialogState::Early, 300..=699) => DialogState::Terminated,
            (state, _) => state,
        };
        if next != inner.state {
            debug!(dialog = %self.id, previous = ?inner.state, current = ?next, "dialog state changed");
            inner.state = next;
        }
        next
    }

    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.state = DialogState::Terminated;
        inner.transactions.clear();
    }

    pub fn add_transaction(&self, transaction: DialogTransaction) {
        let key = transaction.key().clone();
        self.inner.lock().transactions.insert(key, transaction);
    }

    pub fn remove_transaction(&self, key: &TransactionKey) -> Option<DialogTransaction> {
        self.inner.lock().transactions.remove(key)
    }

    pub fn transaction(&self, key: &TransactionKey) -> Option<DialogTransaction> {
        self.inner.lock().transactions.get(key).cloned()
    }

    pub fn transaction_keys(&self) -> Vec<TransactionKey> {
        self.inner.lock().transactions.keys().cloned().collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.lock().transactions.len()
    }

    /// Drops terminated transactions and returns how many were removed.
    pub fn prune_terminated(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.transactions.len();
        inner.transactions.retain(|_, tx| !tx.is_terminated());
        before - inner.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use sipmesh_sip_core::SipUri;

    use super::*;
    use crate::message::{Method, NameAddr, StatusCode, Via};

    fn invite() -> Request {
        Request::new(Method::Invite, &SipUri::from_str("sip:bob@biloxi.com").unwrap())
            .with_via(Via::new("UDP", "pc33.atlanta.com", Some("z9hG4bKd".into())))
            .with_from(NameAddr::from_str("<sip:alice@atlanta.com>;tag=alice-tag").unwrap())
            .with_to(NameAddr::from_str("<sip:bob@biloxi.com>").unwrap())
            .with_call_id("dlg-1")
            .with_cseq(1)
    }

    #[test]
    fn test_ids_from_both_sides_agree() {
        let ok = Response::from_request(&invite(), StatusCode::OK).with_to_tag("bob-tag");
        let uac = DialogId::from_incoming_response(&ok).unwrap();
        let uas = DialogId::from_outgoing_response(&ok).unwrap();
        assert_eq!(uac, DialogId::new("dlg-1", "alice-tag", "bob-tag"));
        assert_eq!(uas, DialogId::new("dlg-1", "bob-tag", "alice-tag"));

        let mut bye = invite();
        bye.method = Method::Bye;
        bye.headers.to = ok.headers.to.clone();
        assert_eq!(DialogId::from_incoming_request(&bye), Some(uas));
        assert!(DialogId::from_incoming_request(&invite()).is_none());
    }

    #[test]
    fn test_early_dialog_lifecycle() {
        let ringing = Response::from_request(&invite(), StatusCode::RINGING).with_to_tag("bob-tag");
        let dialog = Dialog::from_response(&ringing, false).unwrap();
        assert_eq!(dialog.state(), DialogState::Early);

        let ok = Response::from_request(&invite(), StatusCode::OK).with_to_tag("bob-tag");
        assert_eq!(dialog.update_from_response(&ok), DialogState::Confirmed);
        let busy = Response::from_request(&invite(), StatusCode::BUSY_HERE).with_to_tag("bob-tag");
        assert_eq!(dialog.update_from_response(&busy), DialogState::Confirmed);

        let trying = Response::from_request(&invite(), StatusCode::TRYING).with_to_tag("x");
        assert!(Dialog::from_response(&trying, false).is_none());
    }
}
