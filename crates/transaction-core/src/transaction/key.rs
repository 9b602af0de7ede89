use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::{Method, Request, Response};

/// Identifies a transaction inside a [`TransactionRegistry`](crate::registry::TransactionRegistry).
///
/// Server transactions are keyed by the top Via branch alone, except that a CANCEL
/// gets its own key (`branch/CANCEL`) since it shares the branch of the INVITE it
/// cancels. An ACK for a non-2xx response carries the INVITE's branch, so it lands on
/// the INVITE transaction.
///
/// Client transactions are keyed by branch plus the CSeq method, which is all a
/// response carries back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionKey {
    pub branch: String,
    /// Method that is part of the key: always set for client keys, only `CANCEL` for server keys.
    pub method: Option<Method>,
    pub is_server: bool,
}

impl TransactionKey {
    pub fn server(branch: impl Into<String>, method: &Method) -> Self {
        Self {
            branch: branch.into(),
            method: (*method == Method::Cancel).then_some(Method::Cancel),
            is_server: true,
        }
    }

    pub fn client(branch: impl Into<String>, method: &Method) -> Self {
        Self {
            branch: branch.into(),
            method: Some(method.clone()),
            is_server: false,
        }
    }

    /// Key of the server transaction an inbound request belongs to.
    pub fn from_request(request: &Request) -> Option<Self> {
        let branch = request.branch().filter(|b| !b.is_empty())?;
        Some(Self::server(branch, request.method()))
    }

    /// Key of the client transaction an outbound request creates.
    pub fn for_outgoing_request(request: &Request) -> Option<Self> {
        let branch = request.branch().filter(|b| !b.is_empty())?;
        Some(Self::client(branch, request.method()))
    }

    /// Key of the client transaction an inbound response belongs to.
    pub fn from_response(response: &Response) -> Option<Self> {
        let branch = response.branch().filter(|b| !b.is_empty())?;
        let cseq = response.cseq()?;
        Some(Self::client(branch, &cseq.method))
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.branch)?;
        if let Some(method) = &self.method {
            write!(f, "/{}", method)?;
        }
        f.write_str(if self.is_server { ":server" } else { ":client" })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use sipmesh_sip_core::SipUri;

    use super::*;
    use crate::message::{StatusCode, Via};

    fn request(method: Method, branch: &str) -> Request {
        Request::new(method, &SipUri::from_str("sip:bob@biloxi.com").unwrap())
            .with_via(Via::new("UDP", "pc33.atlanta.com", Some(branch.to_string())))
            .with_cseq(1)
    }

    #[test]
    fn test_server_key_ignores_method_except_cancel() {
        let invite = TransactionKey::from_request(&request(Method::Invite, "z9hG4bK1")).unwrap();
        let ack = TransactionKey::from_request(&request(Method::Ack, "z9hG4bK1")).unwrap();
        let cancel = TransactionKey::from_request(&request(Method::Cancel, "z9hG4bK1")).unwrap();
        assert_eq!(invite, ack);
        assert_ne!(invite, cancel);
        assert_eq!(cancel.to_string(), "z9hG4bK1/CANCEL:server");
    }

    #[test]
    fn test_client_key_uses_cseq_method() {
        let invite = request(Method::Invite, "z9hG4bK2");
        let key = TransactionKey::for_outgoing_request(&invite).unwrap();
        let response = Response::from_request(&invite, StatusCode::RINGING);
        assert_eq!(TransactionKey::from_response(&response), Some(key.clone()));
        assert_eq!(key.to_string(), "z9hG4bK2/INVITE:client");
    }

    #[test]
    fn test_missing_branch_has_no_key() {
        let bare = Request::new(Method::Options, &SipUri::from_str("sip:h").unwrap());
        assert!(TransactionKey::from_request(&bare).is_none());
        assert!(TransactionKey::from_request(&request(Method::Options, "")).is_none());
    }
}
