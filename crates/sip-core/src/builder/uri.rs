//! # SIP URI Builder
//!
//! A mutable builder that assembles a canonical SIP URI string from validated parts.
//!
//! Every setter checks its input against the grammar of the component it sets and
//! marks the builder dirty. [`SipUriBuilder::build`] only recomposes the string (and
//! the backing [`SipUri`]) when something changed since the last build.
//!
//! ## Examples
//!
//! ```rust
//! use sipmesh_sip_core::builder::SipUriBuilder;
//!
//! let mut builder = SipUriBuilder::new();
//! builder.set_scheme("sip").unwrap();
//! builder.set_user_name("alice").unwrap();
//! builder.set_host("atlanta.com").unwrap();
//! builder.set_port(5070).unwrap();
//! builder.set_transport("tcp").unwrap();
//!
//! assert_eq!(builder.build(), "sip:alice@atlanta.com:5070;transport=tcp");
//!
//! // ttl is only valid together with UDP
//! assert!(builder.set_time_to_live(5).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::utils::{escape_uri_string, escape_with};
use crate::syntax;
use crate::types::header::{HeaderField, HeaderFieldCollection};
use crate::types::param::{SipParameter, SipUriParameterCollection};
use crate::types::uri::{parse_ttl, Scheme, SipUri};

/// Builder for [`SipUri`] values.
#[derive(Debug, Clone, Default)]
pub struct SipUriBuilder {
    scheme: Option<Scheme>,
    user_name: Option<String>,
    password: Option<String>,
    host: Option<String>,
    is_ipv6: bool,
    port: Option<u16>,
    parameters: SipUriParameterCollection,
    headers: HeaderFieldCollection,
    has_changed: bool,
    cached_string: String,
    cached_uri: Option<SipUri>,
}

impl SipUriBuilder {
    /// Creates an empty builder. Building it yields an empty string until at least
    /// a scheme and a host are set.
    pub fn new() -> Self {
        Self {
            has_changed: true,
            ..Default::default()
        }
    }

    /// Creates a builder pre-populated from `uri`.
    pub fn from_uri(uri: &SipUri) -> Result<Self> {
        let mut builder = Self::new();
        builder.init(uri)?;
        Ok(builder)
    }

    /// Resets the builder and assigns every component of `uri` through the
    /// validating setters.
    pub fn init(&mut self, uri: &SipUri) -> Result<()> {
        *self = Self::new();
        self.set_scheme(uri.scheme().as_str())?;
        if !uri.user_name().is_empty() {
            self.set_user_name(uri.user_name())?;
        }
        if !uri.password().is_empty() {
            self.set_password(uri.password())?;
        }
        self.set_host(uri.host())?;
        if let Some(port) = uri.port() {
            self.set_port(u32::from(port))?;
        }
        for param in uri.parameters() {
            self.add_parameter(param.name(), param.value())?;
        }
        for header in uri.headers().iter() {
            self.add_header(header.name(), header.value())?;
        }
        trace!(uri = %uri, "builder initialized from uri");
        Ok(())
    }

    pub fn scheme(&self) -> Option<Scheme> {
        self.scheme
    }

    pub fn set_scheme(&mut self, scheme: &str) -> Result<&mut Self> {
        self.scheme = Some(Scheme::from_str(scheme)?);
        self.has_changed = true;
        Ok(self)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Sets the (already escaped) user part. An empty string clears it.
    pub fn set_user_name(&mut self, user: &str) -> Result<&mut Self> {
        if user.is_empty() {
            self.user_name = None;
        } else if syntax::is_user(user) {
            self.user_name = Some(user.to_string());
        } else {
            return Err(Error::malformed("user", format!("invalid user '{}'", user)));
        }
        self.has_changed = true;
        Ok(self)
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Sets the password. An empty string clears it.
    pub fn set_password(&mut self, password: &str) -> Result<&mut Self> {
        if !syntax::is_password(password) {
            return Err(Error::malformed("password", "invalid password characters"));
        }
        self.password = (!password.is_empty()).then(|| password.to_string());
        self.has_changed = true;
        Ok(self)
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// `true` when the current host is an IPv6 reference.
    pub fn is_ipv6(&self) -> bool {
        self.is_ipv6
    }

    /// Sets the host. A value containing `:` is treated as an IPv6 address and
    /// wrapped in brackets unless it already is.
    pub fn set_host(&mut self, host: &str) -> Result<&mut Self> {
        let (value, is_ipv6) = if host.contains(':') {
            if host.starts_with('[') && host.ends_with(']') {
                (host.to_string(), true)
            } else {
                (format!("[{}]", host), true)
            }
        } else {
            (host.to_string(), false)
        };
        if !syntax::is_host(&value) {
            return Err(Error::malformed("host", format!("invalid host '{}'", host)));
        }
        self.host = Some(value);
        self.is_ipv6 = is_ipv6;
        self.has_changed = true;
        Ok(self)
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn set_port(&mut self, port: u32) -> Result<&mut Self> {
        let port = u16::try_from(port)
            .map_err(|_| Error::out_of_range("port", i64::from(port), 0, 65535))?;
        self.port = Some(port);
        self.has_changed = true;
        Ok(self)
    }

    pub fn clear_port(&mut self) -> &mut Self {
        self.port = None;
        self.has_changed = true;
        self
    }

    pub fn transport(&self) -> Option<&str> {
        self.parameters.get("transport")
    }

    pub fn set_transport(&mut self, transport: &str) -> Result<&mut Self> {
        self.set_parameter("transport", transport)
    }

    /// Current ttl, 0 when absent.
    pub fn time_to_live(&self) -> u8 {
        self.parameters
            .get("ttl")
            .and_then(|ttl| parse_ttl(ttl).ok())
            .unwrap_or(0)
    }

    pub fn set_time_to_live(&mut self, ttl: u32) -> Result<&mut Self> {
        if ttl > 255 {
            return Err(Error::out_of_range("ttl", i64::from(ttl), 0, 255));
        }
        self.set_parameter("ttl", &ttl.to_string())
    }

    pub fn maddr(&self) -> Option<&str> {
        self.parameters.get("maddr")
    }

    pub fn set_maddr(&mut self, maddr: &str) -> Result<&mut Self> {
        self.set_parameter("maddr", maddr)
    }

    pub fn method(&self) -> Option<&str> {
        self.parameters.get("method")
    }

    pub fn set_method(&mut self, method: &str) -> Result<&mut Self> {
        self.set_parameter("method", method)
    }

    pub fn user_param(&self) -> Option<&str> {
        self.parameters.get("user")
    }

    pub fn set_user_param(&mut self, user: &str) -> Result<&mut Self> {
        self.set_parameter("user", user)
    }

    pub fn lr(&self) -> bool {
        self.parameters.contains("lr")
    }

    pub fn set_lr(&mut self, lr: bool) -> &mut Self {
        if lr {
            self.parameters.set(SipParameter::flag("lr"));
        } else {
            self.parameters.remove("lr");
        }
        self.has_changed = true;
        self
    }

    pub fn parameters(&self) -> &SipUriParameterCollection {
        &self.parameters
    }

    /// Adds a new parameter. Known parameters are validated like their dedicated
    /// setters; the name must not already be present.
    pub fn add_parameter(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        if self.parameters.contains(name) {
            return Err(Error::DuplicateParameter(name.to_string()));
        }
        self.validate_parameter(name, value)?;
        self.parameters.add(SipParameter::new(name, value))?;
        self.has_changed = true;
        Ok(self)
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<SipParameter> {
        let removed = self.parameters.remove(name);
        if removed.is_some() {
            self.has_changed = true;
        }
        removed
    }

    pub fn headers(&self) -> &HeaderFieldCollection {
        &self.headers
    }

    /// Adds a URI header. `value` is unescaped text; it is escaped when the URI is built.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        if !syntax::is_header_name(name) {
            return Err(Error::malformed("header", format!("invalid header name '{}'", name)));
        }
        self.headers.add(HeaderField::new(name, value))?;
        self.has_changed = true;
        Ok(self)
    }

    pub fn remove_header(&mut self, name: &str) -> Option<HeaderField> {
        let removed = self.headers.remove(name);
        if removed.is_some() {
            self.has_changed = true;
        }
        removed
    }

    /// Returns the canonical URI string, recomposing it only if the builder changed.
    ///
    /// An incomplete builder (no scheme, no host, or a password without a user)
    /// yields an empty string.
    pub fn build(&mut self) -> String {
        if self.has_changed {
            self.cached_string = self.compose();
            self.cached_uri = if self.cached_string.is_empty() {
                None
            } else {
                SipUri::new(self.cached_string.as_str()).ok()
            };
            self.has_changed = false;
        }
        self.cached_string.clone()
    }

    /// The built URI.
    pub fn uri(&mut self) -> Result<SipUri> {
        let built = self.build();
        if let Some(uri) = &self.cached_uri {
            return Ok(uri.clone());
        }
        if built.is_empty() {
            return Err(Error::InvalidUri(
                "builder needs at least a scheme and a host".to_string(),
            ));
        }
        SipUri::new(built)
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.validate_parameter(name, value)?;
        self.parameters.set(SipParameter::new(name, value));
        self.has_changed = true;
        Ok(self)
    }

    fn validate_parameter(&self, name: &str, value: &str) -> Result<()> {
        match name.to_ascii_lowercase().as_str() {
            "ttl" => {
                let ttl = parse_ttl(value)?;
                check_ttl_transport(ttl, self.transport())
            }
            "transport" => {
                if !syntax::is_token(value) {
                    return Err(Error::malformed("transport", format!("'{}' is not a token", value)));
                }
                check_ttl_transport(self.time_to_live(), Some(value))
            }
            "maddr" => {
                if syntax::is_host(value) {
                    Ok(())
                } else {
                    Err(Error::malformed("maddr", format!("'{}' is not a host", value)))
                }
            }
            "method" | "user" => {
                if syntax::is_token(value) {
                    Ok(())
                } else {
                    Err(Error::malformed(name, format!("'{}' is not a token", value)))
                }
            }
            "lr" if value.len() > 2 => {
                Err(Error::malformed("lr", format!("unexpected lr value '{}'", value)))
            }
            _ => {
                if name.is_empty() || !syntax::is_param(name, true) {
                    Err(Error::malformed("parameter", format!("invalid parameter name '{}'", name)))
                } else if !syntax::is_param(value, true) {
                    Err(Error::malformed(name, format!("invalid parameter value '{}'", value)))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn compose(&self) -> String {
        let (Some(scheme), Some(host)) = (self.scheme, self.host.as_deref()) else {
            return String::new();
        };
        if self.password.is_some() && self.user_name.is_none() {
            return String::new();
        }

        let mut out = String::new();
        out.push_str(scheme.as_str());
        out.push(':');
        if let Some(user) = &self.user_name {
            out.push_str(user);
            if let Some(password) = &self.password {
                out.push(':');
                out.push_str(password);
            }
            out.push('@');
        }
        out.push_str(host);
        if let Some(port) = self.port.filter(|p| *p != scheme.default_port()) {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out.push_str(&self.parameters.to_string());
        for (i, header) in self.headers.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(header.name());
            out.push('=');
            out.push_str(&escape_with(header.value(), |c| {
                syntax::is_unreserved(c) || syntax::is_header_unreserved(c)
            }));
        }
        escape_uri_string(&out)
    }
}

fn check_ttl_transport(ttl: u8, transport: Option<&str>) -> Result<()> {
    match transport {
        Some(transport) if ttl > 0 && !transport.eq_ignore_ascii_case("udp") => {
            Err(Error::TtlRequiresUdp(transport.to_string()))
        }
        _ => Ok(()),
    }
}

impl FromStr for SipUriBuilder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_uri(&SipUri::new(s)?)
    }
}

impl TryFrom<&SipUri> for SipUriBuilder {
    type Error = Error;

    fn try_from(uri: &SipUri) -> Result<Self> {
        Self::from_uri(uri)
    }
}

impl fmt::Display for SipUriBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_changed {
            f.write_str(&self.compose())
        } else {
            f.write_str(&self.cached_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> SipUriBuilder {
        let mut builder = SipUriBuilder::new();
        builder.set_scheme("sip").unwrap();
        builder.set_host("example.com").unwrap();
        builder
    }

    #[test]
    fn test_incomplete_builder_yields_empty_string() {
        let mut builder = SipUriBuilder::new();
        assert_eq!(builder.build(), "");
        builder.set_host("h").unwrap();
        assert_eq!(builder.build(), "");
        assert!(builder.uri().is_err());

        let mut builder = complete();
        builder.set_password("secret").unwrap();
        assert_eq!(builder.build(), "");
        builder.set_user_name("bob").unwrap();
        assert_eq!(builder.build(), "sip:bob:secret@example.com");
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let mut builder = complete();
        builder.set_host("2001:db8::1").unwrap();
        assert!(builder.is_ipv6());
        assert_eq!(builder.host(), Some("[2001:db8::1]"));
        builder.set_port(5070).unwrap();
        assert_eq!(builder.build(), "sip:[2001:db8::1]:5070");
        builder.set_host("example.com").unwrap();
        assert!(!builder.is_ipv6());
    }

    #[test]
    fn test_default_port_is_omitted() {
        let mut builder = complete();
        builder.set_port(5060).unwrap();
        assert_eq!(builder.build(), "sip:example.com");
        builder.set_scheme("sips").unwrap();
        assert_eq!(builder.build(), "sips:example.com:5060");
        builder.set_port(5061).unwrap();
        assert_eq!(builder.build(), "sips:example.com");
    }

    #[test]
    fn test_range_checks() {
        let mut builder = complete();
        assert!(matches!(builder.set_port(65536), Err(Error::OutOfRange { .. })));
        assert!(builder.set_port(65535).is_ok());
        assert!(matches!(builder.set_time_to_live(256), Err(Error::OutOfRange { .. })));
        assert!(builder.set_time_to_live(255).is_ok());
        assert_eq!(builder.time_to_live(), 255);
    }

    #[test]
    fn test_ttl_transport_consistency_both_orders() {
        let mut builder = complete();
        builder.set_time_to_live(5).unwrap();
        assert!(matches!(builder.set_transport("tcp"), Err(Error::TtlRequiresUdp(_))));
        builder.set_transport("UDP").unwrap();

        let mut builder = complete();
        builder.set_transport("tcp").unwrap();
        assert!(matches!(builder.set_time_to_live(5), Err(Error::TtlRequiresUdp(_))));
        assert!(builder.set_time_to_live(0).is_ok());

        let mut builder = complete();
        builder.add_parameter("transport", "tls").unwrap();
        assert!(matches!(builder.add_parameter("ttl", "1"), Err(Error::TtlRequiresUdp(_))));
    }

    #[test]
    fn test_setter_validation() {
        let mut builder = complete();
        assert!(builder.set_scheme("tel").is_err());
        assert!(builder.set_user_name("has space").is_err());
        assert!(builder.set_password("a;b").is_err());
        assert!(builder.set_host("").is_err());
        assert!(builder.set_maddr("").is_err());
        assert!(builder.set_method("IN VITE").is_err());
        assert!(builder.add_parameter("x", "a=b").is_err());
        assert!(builder.add_header("", "v").is_err());
    }

    #[test]
    fn test_parameters_and_headers() {
        let mut builder = complete();
        builder.set_lr(true);
        builder.add_parameter("x-custom", "abc").unwrap();
        assert!(matches!(
            builder.add_parameter("X-CUSTOM", "def"),
            Err(Error::DuplicateParameter(_))
        ));
        builder.add_header("subject", "Project X").unwrap();
        assert!(matches!(builder.add_header("Subject", "y"), Err(Error::DuplicateHeader(_))));
        assert_eq!(builder.build(), "sip:example.com;lr;x-custom=abc?subject=Project%20X");

        builder.remove_parameter("x-custom");
        builder.remove_header("subject");
        builder.set_lr(false);
        assert_eq!(builder.build(), "sip:example.com");
    }

    #[test]
    fn test_build_is_memoized_until_changed() {
        let mut builder = complete();
        let first = builder.build();
        assert_eq!(builder.build(), first);
        assert_eq!(builder.to_string(), first);
        builder.set_user_name("alice").unwrap();
        assert_eq!(builder.to_string(), "sip:alice@example.com");
        assert_eq!(builder.build(), "sip:alice@example.com");
        assert_eq!(builder.uri().unwrap().user_name(), "alice");
    }

    #[test]
    fn test_round_trip_through_uri() {
        let raw = "sips:alice:pw@atlanta.com:5070;maddr=239.1.1.1;lr;ttl=3;transport=udp?subject=hi";
        let uri = SipUri::new(raw).unwrap();
        let mut builder = SipUriBuilder::from_uri(&uri).unwrap();
        assert_eq!(builder.build(), raw);
        assert_eq!(builder.uri().unwrap(), uri);

        let mut reparsed = SipUriBuilder::from_str(&builder.build()).unwrap();
        assert_eq!(reparsed.build(), raw);
    }
}
