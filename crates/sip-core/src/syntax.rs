//! # SIP Grammar Predicates
//!
//! Character-class tests and small string transforms for the RFC 3261 ABNF
//! productions used by the URI layer (Section 25.1).
//!
//! Character predicates (`is_*_char`) classify a single `char`. String predicates
//! apply the per-character test over the whole input and stop at the first
//! character that fails. Empty input is accepted only by the predicates whose
//! production allows zero repetitions (`password`, `hvalue`, parameter values):
//! those components are optional in a SIP URI.
//!
//! ```text
//! unreserved  = alphanum / mark
//! mark        = "-" / "_" / "." / "!" / "~" / "*" / "'" / "(" / ")"
//! escaped     = "%" HEXDIG HEXDIG
//! token       = 1*(alphanum / "-" / "." / "!" / "%" / "*" / "_" / "+" / "`" / "'" / "~")
//! user        = 1*( unreserved / escaped / user-unreserved )
//! password    = *( unreserved / escaped / "&" / "=" / "+" / "$" / "," )
//! paramchar   = param-unreserved / unreserved / escaped
//! hname       = 1*( hnv-unreserved / unreserved / escaped )
//! hvalue      = *( hnv-unreserved / unreserved / escaped )
//! ```

/// ALPHA = %x41-5A / %x61-7A
pub fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// DIGIT = %x30-39
pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// alphanum = ALPHA / DIGIT
pub fn is_alphanum(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// HEXDIG, case-insensitive
pub fn is_hex_digit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

/// LHEX = DIGIT / %x61-66 (lowercase a-f only)
pub fn is_lhex(c: char) -> bool {
    c.is_ascii_digit() || ('a'..='f').contains(&c)
}

/// mark = "-" / "_" / "." / "!" / "~" / "*" / "'" / "(" / ")"
pub fn is_mark(c: char) -> bool {
    matches!(c, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
}

/// unreserved = alphanum / mark
pub fn is_unreserved(c: char) -> bool {
    is_alphanum(c) || is_mark(c)
}

/// reserved = ";" / "/" / "?" / ":" / "@" / "&" / "=" / "+" / "$" / ","
pub fn is_reserved(c: char) -> bool {
    matches!(c, ';' | '/' | '?' | ':' | '@' | '&' | '=' | '+' | '$' | ',')
}

/// Characters allowed in a `token`.
pub fn is_token_char(c: char) -> bool {
    is_alphanum(c)
        || matches!(c, '-' | '.' | '!' | '%' | '*' | '_' | '+' | '`' | '\'' | '~')
}

/// Characters allowed in a `word` (Call-ID style values).
pub fn is_word_char(c: char) -> bool {
    is_token_char(c)
        || matches!(
            c,
            '(' | ')' | '<' | '>' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '{' | '}'
        )
}

/// user-unreserved = "&" / "=" / "+" / "$" / "," / ";" / "?" / "/"
pub fn is_user_unreserved(c: char) -> bool {
    matches!(c, '&' | '=' | '+' | '$' | ',' | ';' | '?' | '/')
}

/// Characters a password may carry besides `unreserved` and `escaped`.
pub fn is_password_unreserved(c: char) -> bool {
    matches!(c, '&' | '=' | '+' | '$' | ',')
}

/// Characters allowed in a hostname label sequence.
pub fn is_host_unreserved(c: char) -> bool {
    is_alphanum(c) || matches!(c, '-' | '.')
}

/// param-unreserved = "[" / "]" / "/" / ":" / "&" / "+" / "$"
pub fn is_param_unreserved(c: char) -> bool {
    matches!(c, '[' | ']' | '/' | ':' | '&' | '+' | '$')
}

/// Parameter character test.
///
/// With `all == true` this is the full `paramchar` set (unreserved plus
/// `param-unreserved`); with `all == false` only `unreserved` is accepted.
/// `escaped` sequences are handled by the string predicates.
pub fn is_param_char(c: char, all: bool) -> bool {
    is_unreserved(c) || (all && is_param_unreserved(c))
}

/// hnv-unreserved = "[" / "]" / "/" / "?" / ":" / "+" / "$"
pub fn is_header_unreserved(c: char) -> bool {
    matches!(c, '[' | ']' | '/' | '?' | ':' | '+' | '$')
}

/// Whitespace as used by linear white space folding.
pub fn is_wsp(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Scans `s` accepting `escaped` triplets and any character satisfying `allowed`.
fn scan_escaped(s: &str, allowed: impl Fn(char) -> bool) -> bool {
    let bytes = s.as_bytes();
    let mut chars = s.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '%' {
            if i + 2 >= bytes.len() {
                return false;
            }
            if !(bytes[i + 1] as char).is_ascii_hexdigit()
                || !(bytes[i + 2] as char).is_ascii_hexdigit()
            {
                return false;
            }
            chars.next();
            chars.next();
        } else if !allowed(c) {
            return false;
        }
    }
    true
}

/// `true` when `s` is a non-empty `token`.
pub fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

/// `true` when `s` is a non-empty `word`.
pub fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_word_char)
}

/// `word [ "@" word ]`, the Call-ID grammar.
pub fn is_word_with_at(s: &str) -> bool {
    match s.split_once('@') {
        Some((left, right)) => is_word(left) && is_word(right),
        None => is_word(s),
    }
}

/// `true` when `s` only contains letters and dashes (e.g. extension header names).
pub fn is_alpha_with_dash(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| is_alpha(c) || c == '-')
}

/// `true` when `s` is exactly one `escaped` triplet (`%` HEXDIG HEXDIG).
pub fn is_escaped(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 3 && b[0] == b'%' && b[1].is_ascii_hexdigit() && b[2].is_ascii_hexdigit()
}

/// `user = 1*( unreserved / escaped / user-unreserved )`
pub fn is_user(s: &str) -> bool {
    !s.is_empty() && scan_escaped(s, |c| is_unreserved(c) || is_user_unreserved(c))
}

/// `password = *( unreserved / escaped / "&" / "=" / "+" / "$" / "," )`; empty is valid.
pub fn is_password(s: &str) -> bool {
    scan_escaped(s, |c| is_unreserved(c) || is_password_unreserved(c))
}

/// Hostname, IPv4 address or bracketed IPv6 reference.
pub fn is_host(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if let Some(inner) = s.strip_prefix('[') {
        return match inner.strip_suffix(']') {
            Some(addr) => is_ipv6_reference_body(addr),
            None => false,
        };
    }
    if s.contains(':') {
        return is_ipv6_reference_body(s);
    }
    s.chars().all(is_host_unreserved) && !s.starts_with('.') && !s.starts_with('-')
}

/// Loose IPv6 body check: hex digits, colons and an optional dotted IPv4 tail.
fn is_ipv6_reference_body(s: &str) -> bool {
    !s.is_empty()
        && s.contains(':')
        && s.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
}

/// Parameter name or value: `1*paramchar` (name) or `*paramchar` (value).
///
/// `all` selects whether `param-unreserved` characters are accepted.
pub fn is_param(s: &str, all: bool) -> bool {
    scan_escaped(s, |c| is_param_char(c, all))
}

/// `hname = 1*( hnv-unreserved / unreserved / escaped )`
pub fn is_header_name(s: &str) -> bool {
    !s.is_empty() && scan_escaped(s, |c| is_header_unreserved(c) || is_unreserved(c))
}

/// `hvalue = *( hnv-unreserved / unreserved / escaped )`; empty is valid.
pub fn is_header_value(s: &str) -> bool {
    scan_escaped(s, |c| is_header_unreserved(c) || is_unreserved(c))
}

/// `true` when `s` is a complete quoted-string: DQUOTE *(qdtext / quoted-pair) DQUOTE.
pub fn is_quoted_string(s: &str) -> bool {
    let inner = match s
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) if s.len() >= 2 => inner,
        _ => return false,
    };
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if chars.next().is_none() {
                    return false;
                }
            }
            '"' => return false,
            _ => {}
        }
    }
    true
}

/// Drops any CR that is not immediately followed by LF.
fn drop_lone_cr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' && chars.peek() != Some(&'\n') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Removes CRLF line folds (CRLF followed by SP/HTAB keeps the whitespace only)
/// and drops stray CRs.
fn remove_folding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    if !matches!(chars.peek(), Some(' ') | Some('\t')) {
                        out.push_str("\r\n");
                    }
                }
                // lone CR: dropped
            }
            _ => out.push(c),
        }
    }
    out
}

/// Backslash-escapes every character in `specials` plus the backslash itself.
fn backslash_escape(s: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in drop_lone_cr(s).chars() {
        if c == '\\' || specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Wraps `s` into a quoted-string, escaping `"` and `\`.
pub fn convert_to_quoted_string(s: &str) -> String {
    format!("\"{}\"", backslash_escape(s, &['"']))
}

/// Wraps `s` into a comment, escaping `(`, `)` and `\`.
pub fn convert_to_comment(s: &str) -> String {
    format!("({})", backslash_escape(s, &['(', ')']))
}

/// Backslash-escapes `"` and `\` without adding delimiters.
pub fn escape_string(s: &str) -> String {
    backslash_escape(s, &['"'])
}

/// Resolves quoted-pairs (`\x` becomes `x`). A trailing lone backslash is kept.
pub fn unescape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`convert_to_quoted_string`]: strips the surrounding quotes (when
/// present), removes line folding and resolves quoted-pairs.
pub fn un_quote_string(s: &str) -> String {
    let inner = if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    };
    unescape_string(&remove_folding(inner))
}

/// Inverse of [`convert_to_comment`].
pub fn un_comment_string(s: &str) -> String {
    let inner = if s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        &s[1..s.len() - 1]
    } else {
        s
    };
    unescape_string(&remove_folding(inner))
}

/// Collapses linear white space: CRLF folds and runs of SP/HTAB become a single SP.
pub fn collapse_folding_whitespace(s: &str) -> String {
    let unfolded = remove_folding(s);
    let mut out = String::with_capacity(unfolded.len());
    let mut last_was_wsp = false;
    for c in unfolded.chars() {
        if is_wsp(c) {
            if !last_was_wsp {
                out.push(' ');
            }
            last_was_wsp = true;
        } else {
            out.push(c);
            last_was_wsp = false;
        }
    }
    out
}

/// TEXT-UTF8-TRIM: collapsed linear white space without leading/trailing blanks.
pub fn convert_to_text_utf8_trim(s: &str) -> String {
    collapse_folding_whitespace(s).trim_matches(is_wsp).to_string()
}
