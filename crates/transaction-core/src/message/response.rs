use std::fmt;

use serde::{Deserialize, Serialize};

use super::headers::{CSeq, NameAddr, Via};
use super::request::{HeaderSet, Request};
use super::status::{ResponseClass, StatusCode};
use super::SIP_VERSION;

/// A SIP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderSet,
    pub body: String,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: SIP_VERSION.to_string(),
            status,
            reason: status.reason_phrase().to_string(),
            headers: HeaderSet::default(),
            body: String::new(),
        }
    }

    /// Builds a response to `request` (RFC 3261 Section 8.2.6.2): Via, From, To,
    /// Call-ID and CSeq are copied.
    pub fn from_request(request: &Request, status: StatusCode) -> Self {
        let mut response = Self::new(status);
        response.headers.via = request.headers.via.clone();
        response.headers.from = request.headers.from.clone();
        response.headers.to = request.headers.to.clone();
        response.headers.call_id = request.headers.call_id.clone();
        response.headers.cseq = request.headers.cseq.clone();
        response
    }

    /// Sets the To tag if none is present.
    pub fn with_to_tag(mut self, tag: impl Into<String>) -> Self {
        if let Some(to) = self.headers.to.as_mut() {
            if to.tag.is_none() {
                to.tag = Some(tag.into());
            }
        }
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn class(&self) -> ResponseClass {
        self.status.class()
    }

    pub fn top_via(&self) -> Option<&Via> {
        self.headers.via.first()
    }

    pub fn branch(&self) -> Option<&str> {
        self.top_via().and_then(|via| via.branch.as_deref())
    }

    pub fn call_id(&self) -> Option<&str> {
        self.headers.call_id.as_deref()
    }

    pub fn from_header(&self) -> Option<&NameAddr> {
        self.headers.from.as_ref()
    }

    pub fn to_header(&self) -> Option<&NameAddr> {
        self.headers.to.as_ref()
    }

    pub fn from_tag(&self) -> Option<&str> {
        self.from_header().and_then(|from| from.tag.as_deref())
    }

    pub fn to_tag(&self) -> Option<&str> {
        self.to_header().and_then(|to| to.tag.as_deref())
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        self.headers.cseq.as_ref()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.version, self.status, self.reason)?;
        self.headers.write_to(f, self.body.len())?;
        f.write_str(&self.body)
    }
}
