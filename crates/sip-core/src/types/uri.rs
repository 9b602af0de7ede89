//! # SIP URI
//!
//! An immutable, validated SIP or SIPS URI as defined in
//! [RFC 3261 Section 19.1](https://datatracker.ietf.org/doc/html/rfc3261#section-19.1).
//!
//! ```text
//! sip:user:password@host:port;uri-parameters?headers
//! ```
//!
//! A [`SipUri`] keeps the string it was created from; every accessor reads from that
//! string through the layout computed once at construction. Construction validates
//! each present component against its grammar, so a `SipUri` value is always
//! well-formed.
//!
//! Equality follows the comparison rules of
//! [RFC 3261 Section 19.1.4](https://datatracker.ietf.org/doc/html/rfc3261#section-19.1.4):
//! parameter and header order is irrelevant, the host is case-insensitive and
//! unrecognized parameters only matter when both URIs carry them.
//!
//! ## Examples
//!
//! ```rust
//! use sipmesh_sip_core::types::uri::{Scheme, SipUri};
//! use std::str::FromStr;
//!
//! let uri = SipUri::from_str("sip:alice@atlanta.com;transport=tcp;lr").unwrap();
//! assert_eq!(uri.scheme(), Scheme::Sip);
//! assert_eq!(uri.user_name(), "alice");
//! assert_eq!(uri.host(), "atlanta.com");
//! assert_eq!(uri.transport(), Some("tcp"));
//! assert!(uri.lr());
//!
//! let reordered = SipUri::from_str("sip:alice@ATLANTA.com;lr;transport=tcp").unwrap();
//! assert_eq!(uri, reordered);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::components::SipUriComponents;
use crate::parser::uri::UriLayout;
use crate::parser::utils::{escape_uri_string, escape_with, unescape_lenient};
use crate::syntax;
use crate::types::header::{HeaderField, HeaderFieldCollection};
use crate::types::param::SipUriParameterCollection;

/// Parameters that must be equal, or absent on both sides, for two URIs to match.
const STRICT_PARAMETERS: [&str; 5] = ["user", "ttl", "method", "maddr", "transport"];

/// URI scheme of a SIP URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// SIP URI (non-secure)
    Sip,
    /// SIPS URI (secure SIP)
    Sips,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }

    /// 5060 for `sip`, 5061 for `sips`.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Sip => 5060,
            Scheme::Sips => 5061,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("sip") {
            Ok(Scheme::Sip)
        } else if s.eq_ignore_ascii_case("sips") {
            Ok(Scheme::Sips)
        } else {
            Err(Error::InvalidUri(format!("unsupported scheme '{}'", s)))
        }
    }
}

/// Parses a ttl value: 1 to 3 digits in the `u8` domain.
///
/// Non-numeric input is a format error; numbers above 255 are out of range.
pub fn parse_ttl(value: &str) -> Result<u8> {
    let number = parse_decimal("ttl", value)?;
    u8::try_from(number).map_err(|_| Error::out_of_range("ttl", number, 0, 255))
}

/// Parses a port value in the `u16` domain.
pub fn parse_port(value: &str) -> Result<u16> {
    let number = parse_decimal("port", value)?;
    u16::try_from(number).map_err(|_| Error::out_of_range("port", number, 0, 65535))
}

fn parse_decimal(component: &str, value: &str) -> Result<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(component, format!("'{}' is not a number", value)));
    }
    // Saturate absurdly long digit strings instead of failing on overflow.
    Ok(value.parse::<i64>().unwrap_or(i64::MAX))
}

/// A validated SIP or SIPS URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SipUri {
    raw: String,
    layout: UriLayout,
    scheme: Scheme,
    parameters: SipUriParameterCollection,
    headers: HeaderFieldCollection,
}

impl SipUri {
    /// Parses and validates `raw`.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let layout = UriLayout::scan(&raw).ok_or_else(|| {
            debug!(uri = %raw, "rejected URI without sip/sips scheme");
            Error::InvalidUri(format!("'{}' does not start with sip: or sips:", raw))
        })?;
        let scheme = Scheme::from_str(layout.scheme_raw(&raw))?;

        let host = layout.host(&raw);
        if host.is_empty() {
            return Err(Error::InvalidUri(format!("'{}' has no host", raw)));
        }
        if !syntax::is_host(host) {
            return Err(Error::malformed("host", format!("invalid host '{}'", host)));
        }

        if layout.has_user_info() {
            let user = layout.user(&raw);
            if !syntax::is_user(user) {
                return Err(Error::malformed("user", format!("invalid user '{}'", user)));
            }
            let password = layout.password(&raw);
            if !syntax::is_password(password) {
                return Err(Error::malformed("password", "invalid password characters"));
            }
        }

        if let Some(port) = layout.port_raw(&raw) {
            parse_port(port)?;
        }

        let parameters = SipUriParameterCollection::parse(layout.params(&raw))?;
        validate_parameters(&parameters)?;

        let headers = parse_headers(layout.headers_raw(&raw))?;

        Ok(SipUri {
            raw,
            layout,
            scheme,
            parameters,
            headers,
        })
    }

    /// The string this URI was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Extracts any (possibly composite) component.
    pub fn component(&self, components: SipUriComponents) -> String {
        self.layout.component(&self.raw, components)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// User part as written (still escaped); empty when absent.
    pub fn user_name(&self) -> &str {
        self.layout.user(&self.raw)
    }

    /// Password as written; empty when absent.
    pub fn password(&self) -> &str {
        self.layout.password(&self.raw)
    }

    /// Host as written, including IPv6 brackets.
    pub fn host(&self) -> &str {
        self.layout.host(&self.raw)
    }

    /// Explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.layout.port_raw(&self.raw).and_then(|p| parse_port(p).ok())
    }

    /// Explicit port, or the scheme default.
    pub fn port_or_default(&self) -> u16 {
        self.port().unwrap_or_else(|| self.scheme.default_port())
    }

    pub fn parameters(&self) -> &SipUriParameterCollection {
        &self.parameters
    }

    pub fn headers(&self) -> &HeaderFieldCollection {
        &self.headers
    }

    /// Header region with its leading `?`, unescaped once; empty when absent.
    pub fn headers_string(&self) -> String {
        self.component(SipUriComponents::HEADERS)
    }

    pub fn maddr(&self) -> Option<&str> {
        self.parameters.get("maddr")
    }

    pub fn transport(&self) -> Option<&str> {
        self.parameters.get("transport")
    }

    pub fn method(&self) -> Option<&str> {
        self.parameters.get("method")
    }

    /// Value of the `user` URI parameter (e.g. `phone`).
    pub fn user_param(&self) -> Option<&str> {
        self.parameters.get("user")
    }

    /// `true` when the loose-routing `lr` parameter is present.
    pub fn lr(&self) -> bool {
        self.parameters.contains("lr")
    }

    /// The ttl parameter, or 0 when absent.
    pub fn time_to_live(&self) -> Result<u8> {
        match self.parameters.get("ttl") {
            Some(value) => parse_ttl(value),
            None => Ok(0),
        }
    }

    /// `true` when the host is a bracketed IPv6 reference.
    pub fn is_ipv6(&self) -> bool {
        self.host().starts_with('[')
    }
}

fn validate_parameters(parameters: &SipUriParameterCollection) -> Result<()> {
    for param in parameters {
        if param.name().is_empty() || !syntax::is_param(param.name(), true) {
            return Err(Error::malformed(
                "parameter",
                format!("invalid parameter name '{}'", param.name()),
            ));
        }
        if !syntax::is_param(param.value(), true) {
            return Err(Error::malformed(
                param.name(),
                format!("invalid parameter value '{}'", param.value()),
            ));
        }
    }

    if let Some(ttl) = parameters.get("ttl") {
        parse_ttl(ttl)?;
    }
    if let Some(maddr) = parameters.get("maddr") {
        if !syntax::is_host(maddr) {
            return Err(Error::malformed("maddr", format!("'{}' is not a host", maddr)));
        }
    }
    for name in ["method", "user", "transport"] {
        if let Some(value) = parameters.get(name) {
            if !syntax::is_token(value) {
                return Err(Error::malformed(name, format!("'{}' is not a token", value)));
            }
        }
    }
    if let Some(lr) = parameters.get("lr") {
        if lr.len() > 2 {
            return Err(Error::malformed("lr", format!("unexpected lr value '{}'", lr)));
        }
    }
    Ok(())
}

fn parse_headers(region: &str) -> Result<HeaderFieldCollection> {
    let mut headers = HeaderFieldCollection::new();
    let region = region.strip_prefix('?').unwrap_or(region);
    for segment in region.split('&').filter(|s| !s.is_empty()) {
        let field = HeaderField::parse(segment);
        if !syntax::is_header_name(field.name()) {
            return Err(Error::malformed("header", format!("invalid header name '{}'", field.name())));
        }
        if !syntax::is_header_value(field.value()) {
            return Err(Error::malformed(
                field.name(),
                format!("invalid header value '{}'", field.value()),
            ));
        }
        headers.add(HeaderField::new(
            unescape_lenient(field.name()),
            unescape_lenient(field.value()),
        ))?;
    }
    Ok(headers)
}

impl PartialEq for SipUri {
    fn eq(&self, other: &Self) -> bool {
        if self.scheme != other.scheme {
            return false;
        }
        if unescape_lenient(self.user_name()) != unescape_lenient(other.user_name()) {
            return false;
        }
        if unescape_lenient(self.password()) != unescape_lenient(other.password()) {
            return false;
        }
        if !unescape_lenient(self.host()).eq_ignore_ascii_case(&unescape_lenient(other.host())) {
            return false;
        }
        let port = self.layout.port_raw(&self.raw).unwrap_or("");
        let other_port = other.layout.port_raw(&other.raw).unwrap_or("");
        if !port.eq_ignore_ascii_case(other_port) {
            return false;
        }
        if !self.headers.set_eq(&other.headers) {
            return false;
        }

        for name in STRICT_PARAMETERS {
            match (self.parameters.get(name), other.parameters.get(name)) {
                (None, None) => {}
                (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => {}
                _ => return false,
            }
        }
        self.parameters.iter().all(|param| {
            match other.parameters.get(param.name()) {
                Some(value) => value.eq_ignore_ascii_case(param.value()),
                None => true,
            }
        })
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(self.raw.len());
        out.push_str(self.scheme.as_str());
        out.push(':');
        let user = self.user_name();
        if !user.is_empty() {
            out.push_str(user);
            let password = self.password();
            if !password.is_empty() {
                out.push(':');
                out.push_str(password);
            }
            out.push('@');
        }
        out.push_str(self.host());
        if let Some(port) = self.layout.port_raw(&self.raw) {
            out.push(':');
            out.push_str(port);
        }
        out.push_str(self.layout.params(&self.raw));
        for (i, header) in self.headers.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(&escape_header_text(header.name()));
            out.push('=');
            out.push_str(&escape_header_text(header.value()));
        }
        f.write_str(&escape_uri_string(&out))
    }
}

impl FromStr for SipUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SipUri::new(s)
    }
}

impl TryFrom<String> for SipUri {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        SipUri::new(value)
    }
}

impl TryFrom<&str> for SipUri {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        SipUri::new(value)
    }
}

// Serialized as written, so escapes inside header values survive a round trip.
impl From<SipUri> for String {
    fn from(uri: SipUri) -> Self {
        uri.raw
    }
}

fn escape_header_text(text: &str) -> String {
    escape_with(text, |c| syntax::is_unreserved(c) || syntax::is_header_unreserved(c))
}
