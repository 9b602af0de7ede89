use std::fmt;

use serde::{Deserialize, Serialize};
use sipmesh_sip_core::SipUri;

use super::headers::{CSeq, NameAddr, Via};
use super::method::Method;
use super::SIP_VERSION;
use crate::error::Result;

/// Headers the transaction layer understands, plus everything else in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderSet {
    /// Via values, topmost first.
    pub via: Vec<Via>,
    pub from: Option<NameAddr>,
    pub to: Option<NameAddr>,
    pub call_id: Option<String>,
    pub cseq: Option<CSeq>,
    pub max_forwards: Option<u32>,
    /// Remaining headers as `(name, value)` pairs.
    pub other: Vec<(String, String)>,
}

impl HeaderSet {
    /// Case-insensitive lookup in the untyped headers.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.other
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces every untyped header called `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.other.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.other.push((name, value.into()));
    }

    pub(crate) fn write_to(&self, f: &mut fmt::Formatter<'_>, body_len: usize) -> fmt::Result {
        for via in &self.via {
            write!(f, "Via: {}\r\n", via)?;
        }
        if let Some(from) = &self.from {
            write!(f, "From: {}\r\n", from)?;
        }
        if let Some(to) = &self.to {
            write!(f, "To: {}\r\n", to)?;
        }
        if let Some(call_id) = &self.call_id {
            write!(f, "Call-ID: {}\r\n", call_id)?;
        }
        if let Some(cseq) = &self.cseq {
            write!(f, "CSeq: {}\r\n", cseq)?;
        }
        if let Some(max_forwards) = self.max_forwards {
            write!(f, "Max-Forwards: {}\r\n", max_forwards)?;
        }
        for (name, value) in &self.other {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        write!(f, "Content-Length: {}\r\n\r\n", body_len)
    }
}

/// A SIP request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    /// Request-URI exactly as received; it may use a scheme other than sip/sips.
    pub uri: String,
    pub version: String,
    pub headers: HeaderSet,
    pub body: String,
}

impl Request {
    pub fn new(method: Method, uri: &SipUri) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            version: SIP_VERSION.to_string(),
            headers: HeaderSet::default(),
            body: String::new(),
        }
    }

    pub fn with_via(mut self, via: Via) -> Self {
        self.headers.via.push(via);
        self
    }

    pub fn with_from(mut self, from: NameAddr) -> Self {
        self.headers.from = Some(from);
        self
    }

    pub fn with_to(mut self, to: NameAddr) -> Self {
        self.headers.to = Some(to);
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.headers.call_id = Some(call_id.into());
        self
    }

    pub fn with_cseq(mut self, seq: u32) -> Self {
        self.headers.cseq = Some(CSeq::new(seq, self.method.clone()));
        self
    }

    pub fn with_max_forwards(mut self, max_forwards: u32) -> Self {
        self.headers.max_forwards = Some(max_forwards);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Parses the Request-URI as a SIP URI.
    pub fn sip_uri(&self) -> Result<SipUri> {
        Ok(SipUri::new(self.uri.as_str())?)
    }

    /// Scheme of the Request-URI, lower-cased; empty if there is no `:`.
    pub fn uri_scheme(&self) -> String {
        self.uri
            .trim_start()
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default()
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

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, self.version)?;
        self.headers.write_to(f, self.body.len())?;
        f.write_str(&self.body)
    }
}
