//! Start-line and header-line parsing for the packet-received path.
//!
//! The transport hands over the first line and the remaining header lines of a
//! message. Start lines must parse; individual header lines that do not are logged
//! and skipped so the rest of the message can still be processed.

use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_till1, take_while1, take_while_m_n},
    character::complete::{char, digit1, space0, space1},
    combinator::{all_consuming, eof, map_res, recognize, rest},
    sequence::{preceded, terminated, tuple},
    IResult,
};
use sipmesh_sip_core::syntax::{collapse_folding_whitespace, is_token_char};
use tracing::warn;

use super::headers::{CSeq, NameAddr, Via};
use super::method::Method;
use super::request::{HeaderSet, Request};
use super::response::Response;
use super::status::StatusCode;
use super::Message;
use crate::error::{Error, Result};

/// `Method SP Request-URI SP SIP-Version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: String,
    pub version: String,
}

/// `SIP-Version SP Status-Code SP Reason-Phrase`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request(RequestLine),
    Status(StatusLine),
}

fn bad_request(reason: String) -> Error {
    Error::ProtocolViolation { status: 400, reason }
}

/// `SIP/1*DIGIT.1*DIGIT`
fn sip_version(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag_no_case("SIP/"), digit1, char('.'), digit1)))(input)
}

fn status_line(input: &str) -> IResult<&str, (&str, u16, &str)> {
    tuple((
        terminated(sip_version, space1),
        map_res(
            take_while_m_n(3, 3, |c: char| c.is_ascii_digit()),
            str::parse::<u16>,
        ),
        alt((preceded(space1, rest), eof)),
    ))(input)
}

fn request_line(input: &str) -> IResult<&str, (&str, &str, &str)> {
    all_consuming(tuple((
        terminated(take_while1(is_token_char), space1),
        terminated(take_till1(|c: char| c.is_whitespace()), space1),
        sip_version,
    )))(input)
}

/// Parses the first line of a message.
pub fn parse_start_line(line: &str) -> Result<StartLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.get(..4).is_some_and(|prefix| prefix.eq_ignore_ascii_case("SIP/")) {
        let (_, (version, code, reason)) =
            status_line(line).map_err(|_| bad_request(format!("malformed status line '{}'", line)))?;
        let status = StatusCode::new(code)
            .ok_or_else(|| bad_request(format!("status code {} out of range", code)))?;
        return Ok(StartLine::Status(StatusLine {
            version: version.to_ascii_uppercase(),
            status,
            reason: reason.trim().to_string(),
        }));
    }

    let (_, (method, uri, version)) =
        request_line(line).map_err(|_| bad_request(format!("malformed request line '{}'", line)))?;
    Ok(StartLine::Request(RequestLine {
        method: Method::from_str(method)?,
        uri: uri.to_string(),
        version: version.to_ascii_uppercase(),
    }))
}

/// Expands RFC 3261 compact header names.
pub fn expand_compact_name(name: &str) -> &str {
    match name {
        "v" | "V" => "Via",
        "f" | "F" => "From",
        "t" | "T" => "To",
        "i" | "I" => "Call-ID",
        "m" | "M" => "Contact",
        "l" | "L" => "Content-Length",
        "c" | "C" => "Content-Type",
        "e" | "E" => "Content-Encoding",
        "k" | "K" => "Supported",
        "s" | "S" => "Subject",
        other => other,
    }
}

fn header_line(input: &str) -> IResult<&str, (&str, &str)> {
    tuple((
        take_while1(is_token_char),
        preceded(tuple((space0, char(':'), space0)), rest),
    ))(input)
}

/// Parses `Name: value` into the (compact-form expanded) name and trimmed value.
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (_, (name, value)) =
        header_line(line).map_err(|_| bad_request(format!("malformed header line '{}'", line)))?;
    Ok((
        expand_compact_name(name).to_string(),
        collapse_folding_whitespace(value).trim().to_string(),
    ))
}

/// Applies one header line to `headers`.
fn apply_header(headers: &mut HeaderSet, line: &str) -> Result<()> {
    let (name, value) = parse_header_line(line)?;
    match name.to_ascii_lowercase().as_str() {
        "via" => {
            for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                headers.via.push(Via::from_str(part)?);
            }
        }
        "from" => headers.from = Some(NameAddr::from_str(&value)?),
        "to" => headers.to = Some(NameAddr::from_str(&value)?),
        "call-id" => headers.call_id = Some(value),
        "cseq" => headers.cseq = Some(CSeq::from_str(&value)?),
        "max-forwards" => {
            let hops = value
                .parse::<u32>()
                .map_err(|_| bad_request(format!("invalid Max-Forwards '{}'", value)))?;
            headers.max_forwards = Some(hops);
        }
        // Recomputed from the body on output.
        "content-length" => {}
        _ => headers.other.push((name, value)),
    }
    Ok(())
}

/// Builds a header set from raw header lines, skipping (and logging) bad ones.
pub fn assemble_headers<S: AsRef<str>>(lines: &[S]) -> HeaderSet {
    let mut headers = HeaderSet::default();
    for line in lines.iter().map(AsRef::as_ref) {
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = apply_header(&mut headers, line) {
            // Ignore and keep processing the rest of the headers.
            warn!(line = %line, error = %e, "ignoring malformed header line");
        }
    }
    headers
}

/// Builds a request from its parsed start line and raw header lines.
pub fn assemble_request<S: AsRef<str>>(line: RequestLine, header_lines: &[S]) -> Request {
    Request {
        method: line.method,
        uri: line.uri,
        version: line.version,
        headers: assemble_headers(header_lines),
        body: String::new(),
    }
}

/// Builds a response from its parsed status line and raw header lines.
pub fn assemble_response<S: AsRef<str>>(line: StatusLine, header_lines: &[S]) -> Response {
    Response {
        version: line.version,
        status: line.status,
        reason: line.reason,
        headers: assemble_headers(header_lines),
        body: String::new(),
    }
}

/// Splits a complete message into start line, unfolded header lines and body.
pub fn split_message(text: &str) -> (String, Vec<String>, String) {
    let (head, body) = match text.find("\r\n\r\n") {
        Some(i) => (&text[..i], &text[i + 4..]),
        None => match text.find("\n\n") {
            Some(i) => (&text[..i], &text[i + 2..]),
            None => (text, ""),
        },
    };

    let mut lines = head.lines();
    let start = lines.next().unwrap_or_default().to_string();
    let mut headers: Vec<String> = Vec::new();
    for line in lines {
        match headers.last_mut() {
            Some(previous) if line.starts_with([' ', '\t']) => {
                previous.push(' ');
                previous.push_str(line.trim());
            }
            _ => headers.push(line.to_string()),
        }
    }
    (start, headers, body.to_string())
}

/// Parses a complete message.
pub fn parse_message(text: &str) -> Result<Message> {
    let (start, header_lines, body) = split_message(text);
    Ok(match parse_start_line(&start)? {
        StartLine::Request(line) => {
            let mut request = assemble_request(line, &header_lines);
            request.body = body;
            Message::Request(request)
        }
        StartLine::Status(line) => {
            let mut response = assemble_response(line, &header_lines);
            response.body = body;
            Message::Response(response)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE: &str = "INVITE sip:bob@biloxi.com SIP/2.0\r\n\
        v: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
        Max-Forwards: 70\r\n\
        t: Bob <sip:bob@biloxi.com>\r\n\
        f: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
        i: a84b4c76e66710@pc33.atlanta.com\r\n\
        CSeq: 314159 INVITE\r\n\
        Subject: long\r\n  folded subject\r\n\
        Content-Length: 4\r\n\
        \r\n\
        body";

    #[test]
    fn test_parse_request_line() {
        match parse_start_line("INVITE sip:bob@biloxi.com SIP/2.0").unwrap() {
            StartLine::Request(line) => {
                assert_eq!(line.method, Method::Invite);
                assert_eq!(line.uri, "sip:bob@biloxi.com");
                assert_eq!(line.version, "SIP/2.0");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_start_line("INVITE sip:bob@biloxi.com").is_err());
        assert!(parse_start_line("").is_err());
    }

    #[test]
    fn test_parse_status_line() {
        match parse_start_line("SIP/2.0 180 Ringing\r\n").unwrap() {
            StartLine::Status(line) => {
                assert_eq!(line.status, StatusCode::RINGING);
                assert_eq!(line.reason, "Ringing");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_start_line("SIP/2.0 99 Low").is_err());
        assert!(parse_start_line("SIP/2.0 abc Bad").is_err());
        assert!(parse_start_line("SIP/2.0 1800 Long").is_err());
    }

    #[test]
    fn test_non_ascii_start_line_is_rejected() {
        assert!(parse_start_line("INV\u{e9}TE sip:a@b SIP/2.0").is_err());
        assert!(parse_start_line("SI\u{e9}/2.0 200 OK").is_err());
        assert!(parse_start_line("\u{e9}").is_err());
    }

    #[test]
    fn test_version_is_not_validated_here() {
        match parse_start_line("OPTIONS sip:h SIP/3.0").unwrap() {
            StartLine::Request(line) => assert_eq!(line.version, "SIP/3.0"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_header_line_compact_forms() {
        assert_eq!(
            parse_header_line("v: SIP/2.0/UDP h").unwrap(),
            ("Via".to_string(), "SIP/2.0/UDP h".to_string())
        );
        assert_eq!(parse_header_line("i:abc").unwrap().0, "Call-ID");
        assert_eq!(parse_header_line("X-Custom : value ").unwrap().1, "value");
        assert!(parse_header_line("no colon here").is_err());
    }

    #[test]
    fn test_parse_message() {
        let message = parse_message(INVITE).unwrap();
        let Message::Request(request) = message else {
            panic!("expected request");
        };
        assert_eq!(request.method, Method::Invite);
        assert_eq!(request.branch(), Some("z9hG4bK776asdhds"));
        assert_eq!(request.call_id(), Some("a84b4c76e66710@pc33.atlanta.com"));
        assert_eq!(request.from_tag(), Some("1928301774"));
        assert_eq!(request.to_tag(), None);
        assert_eq!(request.cseq().map(|c| c.seq), Some(314159));
        assert_eq!(request.headers.max_forwards, Some(70));
        assert_eq!(request.headers.get("subject"), Some("long folded subject"));
        assert_eq!(request.body, "body");
    }

    #[test]
    fn test_bad_header_lines_are_skipped() {
        let request = assemble_request(
            RequestLine {
                method: Method::Options,
                uri: "sip:h".to_string(),
                version: "SIP/2.0".to_string(),
            },
            &[
                "Via: SIP/2.0/UDP h;branch=z9hG4bKa",
                "CSeq: not-a-number OPTIONS",
                "garbage line",
                "Call-ID: abc",
            ],
        );
        assert_eq!(request.branch(), Some("z9hG4bKa"));
        assert!(request.cseq().is_none());
        assert_eq!(request.call_id(), Some("abc"));
    }

    #[test]
    fn test_multiple_vias_in_one_line() {
        let response = assemble_response(
            StatusLine {
                version: "SIP/2.0".to_string(),
                status: StatusCode::OK,
                reason: "OK".to_string(),
            },
            &["Via: SIP/2.0/UDP a;branch=z9hG4bK1, SIP/2.0/TCP b;branch=z9hG4bK2"],
        );
        assert_eq!(response.headers.via.len(), 2);
        assert_eq!(response.branch(), Some("z9hG4bK1"));
        assert_eq!(response.headers.via[1].transport, "TCP");
    }

    #[test]
    fn test_display_round_trip() {
        let Message::Request(request) = parse_message(INVITE).unwrap() else {
            panic!("expected request");
        };
        let Message::Request(again) = parse_message(&request.to_string()).unwrap() else {
            panic!("expected request");
        };
        assert_eq!(again, request);
    }
}
