//! Typed header values the transaction layer reads and writes: `Via`, `CSeq`,
//! and the name-addr form used by `From`/`To`.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{tag_no_case, take_till, take_till1, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::map_res,
    sequence::{delimited, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use sipmesh_sip_core::syntax::{convert_to_quoted_string, is_token_char, un_quote_string};
use sipmesh_sip_core::SipUri;

use super::method::Method;
use crate::error::{Error, Result};

/// RFC 3261 magic cookie that prefixes compliant branch values.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

fn bad_header(name: &str, value: &str) -> Error {
    Error::ProtocolViolation {
        status: 400,
        reason: format!("malformed {} header '{}'", name, value),
    }
}

/// Splits `;a=b;c` into name/value pairs (value empty for flags).
fn parse_header_params(params: &str) -> Vec<(String, String)> {
    params
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((n, v)) => (n.trim().to_string(), v.trim().to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect()
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[(String, String)]) -> fmt::Result {
    for (name, value) in params {
        if value.is_empty() {
            write!(f, ";{}", name)?;
        } else {
            write!(f, ";{}={}", name, value)?;
        }
    }
    Ok(())
}

/// A single Via header value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    /// Transport token (`UDP`, `TCP`, ...), upper-cased.
    pub transport: String,
    /// `host[:port]`
    pub sent_by: String,
    pub branch: Option<String>,
    pub received: Option<String>,
    /// `Some("")` for a bare `rport`.
    pub rport: Option<String>,
    /// Other parameters in order of appearance.
    pub params: Vec<(String, String)>,
}

impl Via {
    pub fn new(transport: &str, sent_by: impl Into<String>, branch: Option<String>) -> Self {
        Self {
            transport: transport.to_ascii_uppercase(),
            sent_by: sent_by.into(),
            branch,
            received: None,
            rport: None,
            params: Vec::new(),
        }
    }

    /// Generates a fresh RFC 3261 branch value.
    pub fn generate_branch() -> String {
        format!("{}{}", BRANCH_MAGIC_COOKIE, uuid::Uuid::new_v4().simple())
    }
}

/// `SIP/2.0/UDP host:port;params`
fn via_value(input: &str) -> IResult<&str, (&str, &str, &str)> {
    tuple((
        preceded(
            tuple((tag_no_case("SIP"), space0, char('/'), space0)),
            take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        ),
        preceded(
            tuple((space0, char('/'), space0)),
            take_while1(is_token_char),
        ),
        preceded(space1, take_till1(|c: char| c == ';' || c.is_whitespace())),
    ))(input)
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (remaining, (_version, transport, sent_by)) =
            via_value(s).map_err(|_| bad_header("Via", s))?;
        let mut via = Via::new(transport, sent_by, None);
        for (name, value) in parse_header_params(remaining) {
            match name.to_ascii_lowercase().as_str() {
                "branch" => via.branch = Some(value),
                "received" => via.received = Some(value),
                "rport" => via.rport = Some(value),
                _ => via.params.push((name, value)),
            }
        }
        Ok(via)
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.sent_by)?;
        if let Some(branch) = &self.branch {
            write!(f, ";branch={}", branch)?;
        }
        if let Some(received) = &self.received {
            write!(f, ";received={}", received)?;
        }
        match self.rport.as_deref() {
            Some("") => f.write_str(";rport")?,
            Some(rport) => write!(f, ";rport={}", rport)?,
            None => {}
        }
        write_params(f, &self.params)
    }
}

/// CSeq header: sequence number and method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        Self { seq, method }
    }
}

fn cseq_value(input: &str) -> IResult<&str, (u32, &str)> {
    tuple((
        preceded(space0, map_res(digit1, str::parse::<u32>)),
        preceded(space1, take_while1(is_token_char)),
    ))(input)
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match cseq_value(s.trim()) {
            Ok(("", (seq, method))) => Ok(CSeq::new(seq, Method::from_str(method)?)),
            _ => Err(bad_header("CSeq", s)),
        }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

/// `[display-name] <uri>;params`, the value of `From` and `To`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameAddr {
    pub display_name: Option<String>,
    pub uri: SipUri,
    pub tag: Option<String>,
    pub params: Vec<(String, String)>,
}

impl NameAddr {
    pub fn new(uri: SipUri) -> Self {
        Self {
            display_name: None,
            uri,
            tag: None,
            params: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Generates a random tag value.
    pub fn generate_tag() -> String {
        format!("{:08x}", rand::random::<u32>())
    }
}

/// Skips the display name and returns the URI between `<` and `>`.
fn bracketed_uri(input: &str) -> IResult<&str, &str> {
    preceded(
        take_till(|c: char| c == '<'),
        delimited(char('<'), take_till1(|c: char| c == '>'), char('>')),
    )(input)
}

impl FromStr for NameAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (display_name, uri, params) = match s.find('<') {
            Some(open) => {
                let (params, uri) = bracketed_uri(s).map_err(|_| bad_header("name-addr", s))?;
                let display = s[..open].trim();
                let display = (!display.is_empty()).then(|| un_quote_string(display));
                (display, uri, params)
            }
            // addr-spec form: parameters belong to the header, not the URI
            None => match s.split_once(';') {
                Some((uri, params)) => (None, uri, params),
                None => (None, s, ""),
            },
        };

        let mut name_addr = NameAddr::new(SipUri::new(uri.trim())?);
        name_addr.display_name = display_name;
        for (name, value) in parse_header_params(params) {
            if name.eq_ignore_ascii_case("tag") {
                name_addr.tag = Some(value);
            } else {
                name_addr.params.push((name, value));
            }
        }
        Ok(name_addr)
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "{} ", convert_to_quoted_string(name))?;
        }
        write!(f, "<{}>", self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        write_params(f, &self.params)
    }
}
