// Percent-encoding helpers for SIP URI components

use crate::error::{Error, Result};
use crate::syntax::{is_reserved, is_unreserved};

/// Decodes URI percent-encoding (%HH) within a byte slice.
///
/// Strict variant: an incomplete or non-hex escape is an error.
pub fn unescape_uri_component(input: &[u8]) -> Result<String> {
    let mut unescaped: Vec<u8> = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        match input[i] {
            b'%' => {
                if i + 2 < input.len() {
                    let h1 = input[i + 1];
                    let h2 = input[i + 2];
                    if let (Some(v1), Some(v2)) = (hex_val(h1), hex_val(h2)) {
                        unescaped.push((v1 << 4) | v2);
                        i += 3;
                    } else {
                        return Err(Error::ParseError(format!(
                            "Invalid hex sequence: %{}{}",
                            h1 as char, h2 as char
                        )));
                    }
                } else {
                    return Err(Error::ParseError(
                        "Incomplete escape sequence at end of input".to_string(),
                    ));
                }
            }
            _ => {
                unescaped.push(input[i]);
                i += 1;
            }
        }
    }

    String::from_utf8(unescaped)
        .map_err(|e| Error::ParseError(format!("UTF-8 error after URI unescaping: {}", e)))
}

/// Decodes every valid `%HH` triplet and leaves anything else untouched.
///
/// Used for comparisons and display, where a stray `%` must not fail the
/// whole operation. Invalid UTF-8 after decoding is replaced lossily.
pub fn unescape_lenient(input: &str) -> String {
    if !input.contains('%') {
        return input.to_string();
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(v1), Some(v2)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push((v1 << 4) | v2);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-escapes every character that may not appear literally in a SIP URI.
///
/// Reserved and unreserved characters, IPv6 brackets and already valid `%HH`
/// escapes pass through unchanged, so escaping an escaped string is a no-op.
pub fn escape_uri_string(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let c = b as char;
        if b == b'%' {
            let valid = i + 2 < bytes.len()
                && hex_val(bytes[i + 1]).is_some()
                && hex_val(bytes[i + 2]).is_some();
            if valid {
                out.push('%');
            } else {
                out.push_str("%25");
            }
        } else if b.is_ascii() && (is_unreserved(c) || is_reserved(c) || c == '[' || c == ']') {
            out.push(c);
        } else {
            push_escaped(&mut out, b);
        }
        i += 1;
    }
    out
}

/// Percent-escapes every byte of `input` whose character fails `allowed`.
pub fn escape_with(input: &str, allowed: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        if b.is_ascii() && allowed(b as char) {
            out.push(b as char);
        } else {
            push_escaped(&mut out, b);
        }
    }
    out
}

fn push_escaped(out: &mut String, b: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    out.push('%');
    out.push(HEX[(b >> 4) as usize] as char);
    out.push(HEX[(b & 0x0F) as usize] as char);
}

// Helper to convert a hex character (byte) to its value (0-15)
fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
