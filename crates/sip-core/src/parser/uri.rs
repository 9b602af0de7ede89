//! # URI Component Extractor
//!
//! A cursor-based scanner that splits a raw SIP URI into its regions:
//!
//! ```text
//! [WSP] scheme ":" [ user [ ":" password ] "@" ] host [ ":" port ] [ ";" params ] [ "?" headers ]
//! ```
//!
//! Region boundaries are anchored on the scheme colon, the first `@` before the
//! header region, and the first `;` or `?` after the host. The scanner never fails
//! on a SIP/SIPS scheme: components it cannot find come back as empty strings, and
//! grammar validation is left to [`SipUri`](crate::types::uri::SipUri).

use std::ops::Range;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while_m_n},
    character::complete::{char, multispace0},
    combinator::{all_consuming, recognize},
    sequence::{preceded, terminated},
    IResult, Offset,
};

use super::components::SipUriComponents;
use super::utils::unescape_lenient;

fn scheme(input: &str) -> IResult<&str, &str> {
    preceded(
        multispace0,
        terminated(alt((tag_no_case("sips"), tag_no_case("sip"))), char(':')),
    )(input)
}

/// Extracted ports are 2 to 5 digits; a single digit is not reported.
fn port_digits(input: &str) -> IResult<&str, &str> {
    all_consuming(recognize(take_while_m_n(2, 5, |c: char| c.is_ascii_digit())))(input)
}

/// Byte ranges of every region of a scanned URI.
///
/// Ranges index into the string that was scanned; an empty range means the
/// region is absent. `params` includes its leading `;` and `headers` its leading `?`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UriLayout {
    scheme: Range<usize>,
    user: Range<usize>,
    password: Range<usize>,
    host: Range<usize>,
    port: Range<usize>,
    params: Range<usize>,
    headers: Range<usize>,
    has_user_info: bool,
    has_port_separator: bool,
}

impl UriLayout {
    /// Scans `raw`. Returns `None` when it does not start with a `sip:` or `sips:` scheme.
    pub fn scan(raw: &str) -> Option<Self> {
        let (rest, scheme_tag) = scheme(raw).ok()?;
        let scheme_start = raw.offset(scheme_tag);
        let mut layout = UriLayout {
            scheme: scheme_start..scheme_start + scheme_tag.len(),
            ..Default::default()
        };

        let body = raw.len() - rest.len();
        let query_bound = rest.find('?').unwrap_or(rest.len());
        let host_start = match rest[..query_bound].find('@') {
            Some(at) => {
                layout.has_user_info = true;
                match rest[..at].find(':') {
                    Some(colon) => {
                        layout.user = body..body + colon;
                        layout.password = body + colon + 1..body + at;
                    }
                    None => layout.user = body..body + at,
                }
                body + at + 1
            }
            None => body,
        };

        let hostport = &raw[host_start..];
        let bracket_end = if hostport.starts_with('[') {
            hostport.find(']').map_or(hostport.len(), |i| i + 1)
        } else {
            0
        };
        let host_len = bracket_end
            + hostport[bracket_end..]
                .find(|c| matches!(c, ':' | ';' | '?'))
                .unwrap_or(hostport.len() - bracket_end);
        layout.host = host_start..host_start + host_len;

        let mut cursor = layout.host.end;
        if raw[cursor..].starts_with(':') {
            layout.has_port_separator = true;
            let port_start = cursor + 1;
            let port_len = raw[port_start..]
                .find(|c| matches!(c, ';' | '?'))
                .unwrap_or(raw.len() - port_start);
            layout.port = port_start..port_start + port_len;
            cursor = layout.port.end;
        }

        if raw[cursor..].starts_with(';') {
            let params_len = raw[cursor..].find('?').unwrap_or(raw.len() - cursor);
            layout.params = cursor..cursor + params_len;
            cursor = layout.params.end;
        }

        if raw[cursor..].starts_with('?') {
            layout.headers = cursor..raw.len();
        }

        Some(layout)
    }

    fn slice<'a>(&self, raw: &'a str, range: &Range<usize>) -> &'a str {
        raw.get(range.clone()).unwrap_or("")
    }

    /// Scheme as written (`sip`, `SIP`, `sips`, ...).
    pub fn scheme_raw<'a>(&self, raw: &'a str) -> &'a str {
        self.slice(raw, &self.scheme)
    }

    pub fn user<'a>(&self, raw: &'a str) -> &'a str {
        self.slice(raw, &self.user)
    }

    pub fn password<'a>(&self, raw: &'a str) -> &'a str {
        self.slice(raw, &self.password)
    }

    pub fn host<'a>(&self, raw: &'a str) -> &'a str {
        self.slice(raw, &self.host)
    }

    /// Everything between `host:` and the parameter/header region, unvalidated.
    pub fn port_raw<'a>(&self, raw: &'a str) -> Option<&'a str> {
        self.has_port_separator.then(|| self.slice(raw, &self.port))
    }

    /// The port if it is a 2 to 5 digit sequence, otherwise empty.
    pub fn port<'a>(&self, raw: &'a str) -> &'a str {
        match self.port_raw(raw).map(port_digits) {
            Some(Ok((_, digits))) => digits,
            _ => "",
        }
    }

    /// Parameter region including the leading `;`.
    pub fn params<'a>(&self, raw: &'a str) -> &'a str {
        self.slice(raw, &self.params)
    }

    /// Header region including the leading `?`, still escaped.
    pub fn headers_raw<'a>(&self, raw: &'a str) -> &'a str {
        self.slice(raw, &self.headers)
    }

    pub fn has_user_info(&self) -> bool {
        self.has_user_info
    }

    /// Finds `;name[=value]` in the parameter region (case-insensitive name)
    /// and returns the whole segment and its value.
    pub fn parameter_segment<'a>(&self, raw: &'a str, name: &str) -> Option<(&'a str, &'a str)> {
        self.params(raw)
            .split(';')
            .filter(|segment| !segment.is_empty())
            .find_map(|segment| {
                let (seg_name, value) = segment.split_once('=').unwrap_or((segment, ""));
                seg_name
                    .eq_ignore_ascii_case(name)
                    .then_some((segment, value))
            })
    }

    /// Extracts `components` from `raw`, which must be the string this layout was scanned from.
    pub fn component(&self, raw: &str, components: SipUriComponents) -> String {
        if components.is_primitive() {
            return self.primitive(raw, components);
        }
        self.composite(raw, components)
    }

    fn primitive(&self, raw: &str, component: SipUriComponents) -> String {
        match component {
            SipUriComponents::SCHEME => self.scheme_raw(raw).to_ascii_lowercase(),
            SipUriComponents::USER_NAME => self.user(raw).to_string(),
            SipUriComponents::PASSWORD => self.password(raw).to_string(),
            SipUriComponents::HOST => self.host(raw).to_string(),
            SipUriComponents::PORT => self.port(raw).to_string(),
            SipUriComponents::PARAMETERS => self.params(raw).to_string(),
            SipUriComponents::HEADERS => match self.headers_raw(raw) {
                "" | "?" => String::new(),
                headers => format!("?{}", unescape_lenient(&headers[1..])),
            },
            SipUriComponents::LR => self
                .parameter_segment(raw, "lr")
                .map(|(segment, _)| segment.to_string())
                .unwrap_or_default(),
            other => other
                .parameter_name()
                .and_then(|name| self.parameter_segment(raw, name))
                .map(|(_, value)| value.to_string())
                .unwrap_or_default(),
        }
    }

    fn composite(&self, raw: &str, components: SipUriComponents) -> String {
        let mut body = String::new();

        let user = self.user(raw);
        let password = self.password(raw);
        let mut user_info = String::new();
        if components.contains(SipUriComponents::USER_NAME) {
            user_info.push_str(user);
        }
        if components.contains(SipUriComponents::PASSWORD) && !password.is_empty() {
            if !user_info.is_empty() {
                user_info.push(':');
            }
            user_info.push_str(password);
        }

        let include_host = components.contains(SipUriComponents::HOST);
        if !user_info.is_empty() {
            body.push_str(&user_info);
            if include_host {
                body.push('@');
            }
        }
        if include_host {
            body.push_str(self.host(raw));
        }
        if components.contains(SipUriComponents::PORT) {
            let port = self.port(raw);
            if !port.is_empty() {
                if include_host {
                    body.push(':');
                }
                body.push_str(port);
            }
        }

        if components.contains(SipUriComponents::PARAMETERS) {
            body.push_str(self.params(raw));
        } else {
            for known in SipUriComponents::KNOWN_PARAMETERS {
                if !components.contains(known) {
                    continue;
                }
                if let Some((segment, _)) = known
                    .parameter_name()
                    .and_then(|name| self.parameter_segment(raw, name))
                {
                    body.push(';');
                    body.push_str(segment);
                }
            }
        }

        if components.contains(SipUriComponents::HEADERS) {
            body.push_str(&self.primitive(raw, SipUriComponents::HEADERS));
        }

        if !components.contains(SipUriComponents::SCHEME) {
            return body;
        }
        let scheme = self.scheme_raw(raw).to_ascii_lowercase();
        if body.is_empty() {
            return scheme;
        }
        let separator = if components.is_http_form() { "://" } else { ":" };
        format!("{}{}{}", scheme, separator, body)
    }
}

/// Component extractor for SIP and SIPS URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SipStyleUriParser;

impl SipStyleUriParser {
    pub fn new() -> Self {
        Self
    }

    /// Returns the requested component(s) of `raw`, or an empty string when they
    /// are absent or `raw` is not a SIP/SIPS URI.
    ///
    /// ```rust
    /// use sipmesh_sip_core::parser::{SipStyleUriParser, SipUriComponents};
    ///
    /// let parser = SipStyleUriParser::new();
    /// let raw = "sip:alice:secret@atlanta.com:5060;transport=tcp?subject=project";
    /// assert_eq!(parser.get_component(raw, SipUriComponents::HOST), "atlanta.com");
    /// assert_eq!(parser.get_component(raw, SipUriComponents::HOST_PORT), "atlanta.com:5060");
    /// assert_eq!(parser.get_component(raw, SipUriComponents::TRANSPORT), "tcp");
    /// assert_eq!(parser.get_component(raw, SipUriComponents::HEADERS), "?subject=project");
    /// ```
    pub fn get_component(&self, raw: &str, components: SipUriComponents) -> String {
        match UriLayout::scan(raw) {
            Some(layout) => layout.component(raw, components),
            None => {
                tracing::trace!(uri = raw, "not a SIP/SIPS URI, no components extracted");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(raw: &str, c: SipUriComponents) -> String {
        SipStyleUriParser::new().get_component(raw, c)
    }

    #[test]
    fn test_scheme() {
        assert_eq!(get("sip:h", SipUriComponents::SCHEME), "sip");
        assert_eq!(get("  SIPS:h", SipUriComponents::SCHEME), "sips");
        assert_eq!(get("tel:+1234", SipUriComponents::SCHEME), "");
        assert_eq!(get("sipx:h", SipUriComponents::HOST), "");
    }

    #[test]
    fn test_user_info() {
        let raw = "sip:alice:secret@atlanta.com";
        assert_eq!(get(raw, SipUriComponents::USER_NAME), "alice");
        assert_eq!(get(raw, SipUriComponents::PASSWORD), "secret");
        assert_eq!(get(raw, SipUriComponents::USER_INFO), "alice:secret");
        assert_eq!(get("sip:alice@h", SipUriComponents::PASSWORD), "");
        assert_eq!(get("sip:h", SipUriComponents::USER_NAME), "");
        assert_eq!(get("sip:+1-212;isub=1@h", SipUriComponents::USER_NAME), "+1-212;isub=1");
    }

    #[test]
    fn test_host_and_port() {
        assert_eq!(get("sip:alice@Atlanta.COM", SipUriComponents::HOST), "Atlanta.COM");
        assert_eq!(get("sip:h:5060;lr", SipUriComponents::HOST), "h");
        assert_eq!(get("sip:h:5060;lr", SipUriComponents::PORT), "5060");
        assert_eq!(get("sip:h:5", SipUriComponents::PORT), "");
        assert_eq!(get("sip:h:50", SipUriComponents::PORT), "50");
        assert_eq!(get("sip:h:65535", SipUriComponents::PORT), "65535");
        assert_eq!(get("sip:h", SipUriComponents::PORT), "");
        assert_eq!(get("sip:h:123456", SipUriComponents::PORT), "");
        assert_eq!(get("sip:h:abc", SipUriComponents::PORT), "");
        assert_eq!(get("sip:[2001:db8::1]:5070", SipUriComponents::HOST), "[2001:db8::1]");
        assert_eq!(get("sip:[2001:db8::1]:5070", SipUriComponents::PORT), "5070");
        assert_eq!(get("sip:h?to=a@b", SipUriComponents::HOST), "h");
    }

    #[test]
    fn test_parameters() {
        let raw = "sip:h;TTL=15;lr;maddr=239.255.255.1;Transport=udp;method=INVITE;user=phone?x=y";
        assert_eq!(get(raw, SipUriComponents::PARAMETERS), ";TTL=15;lr;maddr=239.255.255.1;Transport=udp;method=INVITE;user=phone");
        assert_eq!(get(raw, SipUriComponents::TTL), "15");
        assert_eq!(get(raw, SipUriComponents::LR), "lr");
        assert_eq!(get(raw, SipUriComponents::MADDR), "239.255.255.1");
        assert_eq!(get(raw, SipUriComponents::TRANSPORT), "udp");
        assert_eq!(get(raw, SipUriComponents::METHOD), "INVITE");
        assert_eq!(get(raw, SipUriComponents::USER_PARAM), "phone");
        assert_eq!(get("sip:h;lr=on", SipUriComponents::LR), "lr=on");
        assert_eq!(get("sip:h", SipUriComponents::LR), "");
        assert_eq!(get("sip:h;maddrx=1", SipUriComponents::MADDR), "");
    }

    #[test]
    fn test_headers_are_unescaped_once() {
        let raw = "sip:h;lr?subject=Project%20X&priority=urgent";
        assert_eq!(get(raw, SipUriComponents::HEADERS), "?subject=Project X&priority=urgent");
        assert_eq!(get("sip:h?", SipUriComponents::HEADERS), "");
        assert_eq!(get("sip:h", SipUriComponents::QUERY), "");
    }

    #[test]
    fn test_composites() {
        let raw = "sip:alice:pw@h:5070;lr?a=b";
        assert_eq!(get(raw, SipUriComponents::SCHEME_AND_SERVER), "sip:h:5070");
        assert_eq!(get(raw, SipUriComponents::STRONG_AUTHORITY), "alice:pw@h:5070");
        assert_eq!(get(raw, SipUriComponents::PATH_AND_QUERY), ";lr?a=b");
        assert_eq!(get(raw, SipUriComponents::HTTP_REQUEST_URL), "sip://h:5070;lr?a=b");
        assert_eq!(get(raw, SipUriComponents::SERIALIZATION_INFO_STRING), raw);
        assert_eq!(get("sip:h", SipUriComponents::HOST_PORT), "h");
        assert_eq!(get("sip:h", SipUriComponents::STRONG_AUTHORITY), "h");
        assert_eq!(
            get("sip:h;lr;ttl=3", SipUriComponents::HOST | SipUriComponents::TTL),
            "h;ttl=3"
        );
    }

    #[test]
    fn test_layout_reports_raw_port() {
        let raw = "sip:h:12x;lr";
        let layout = UriLayout::scan(raw).unwrap();
        assert_eq!(layout.port_raw(raw), Some("12x"));
        assert_eq!(layout.port(raw), "");
        assert_eq!(layout.params(raw), ";lr");
        assert_eq!(UriLayout::scan("sip:h").unwrap().port_raw("sip:h"), None);
    }
}
