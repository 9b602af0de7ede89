//! The request/response model the transaction layer reads and writes.
//!
//! Only the parts of a SIP message that transactions, dialogs and the registry touch
//! are typed (`Via`, `From`, `To`, `Call-ID`, `CSeq`, `Max-Forwards`). Every other
//! header is carried through as a name/value pair.

pub mod headers;
pub mod method;
pub mod parse;
pub mod request;
pub mod response;
pub mod status;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use headers::{CSeq, NameAddr, Via, BRANCH_MAGIC_COOKIE};
pub use method::Method;
pub use parse::{
    assemble_headers, assemble_request, assemble_response, parse_header_line, parse_message, parse_start_line,
    RequestLine, StartLine, StatusLine,
};
pub use request::{HeaderSet, Request};
pub use response::Response;
pub use status::{ResponseClass, StatusCode};

/// The only protocol version this stack speaks.
pub const SIP_VERSION: &str = "SIP/2.0";

/// Either side of a SIP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(request) => Some(request),
            Message::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(response) => Some(response),
            Message::Request(_) => None,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            Message::Request(request) => request.call_id(),
            Message::Response(response) => response.call_id(),
        }
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        match self {
            Message::Request(request) => request.cseq(),
            Message::Response(response) => response.cseq(),
        }
    }

    pub fn top_via(&self) -> Option<&Via> {
        match self {
            Message::Request(request) => request.top_via(),
            Message::Response(response) => response.top_via(),
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(request) => request.fmt(f),
            Message::Response(response) => response.fmt(f),
        }
    }
}
