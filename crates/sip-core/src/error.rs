use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, validating or building SIP URIs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The URI as a whole is not a SIP/SIPS URI (bad scheme, missing host, ...)
    #[error("Invalid SIP URI: {0}")]
    InvalidUri(String),

    /// A single URI component contains characters its grammar does not allow
    #[error("Malformed URI component '{component}': {message}")]
    MalformedUriComponent {
        component: String,
        message: String,
    },

    /// A numeric component (port, ttl) is syntactically valid but outside its domain
    #[error("Value {value} for '{component}' is out of range ({min}..={max})")]
    OutOfRange {
        component: String,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A URI parameter with the same (case-insensitive) name already exists
    #[error("Duplicate URI parameter: {0}")]
    DuplicateParameter(String),

    /// A URI header with the same (case-insensitive) name already exists
    #[error("Duplicate URI header: {0}")]
    DuplicateHeader(String),

    /// `ttl` is only meaningful together with the UDP transport
    #[error("ttl parameter requires transport=udp, found transport={0}")]
    TtlRequiresUdp(String),

    /// Low level scanner failure
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Error {
    /// Shorthand for a component-level format error.
    pub fn malformed(component: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedUriComponent {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a range error on a numeric component.
    pub fn out_of_range(component: impl Into<String>, value: i64, min: i64, max: i64) -> Self {
        Error::OutOfRange {
            component: component.into(),
            value,
            min,
            max,
        }
    }

    /// `true` for the syntax class of errors (as opposed to range or duplicate errors).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUri(_) | Error::MalformedUriComponent { .. } | Error::ParseError(_)
        )
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        Error::ParseError(format!("Parsing failed: {err}"))
    }
}
