//! Component selectors for [`SipStyleUriParser::get_component`](super::uri::SipStyleUriParser::get_component).
//!
//! A [`SipUriComponents`] value is a bit set. Primitive components own one bit;
//! composite components are unions of primitives (plus, for the HTTP request
//! form, a marker bit that switches the scheme separator to `://`).

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of URI components to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SipUriComponents(u32);

impl SipUriComponents {
    pub const NONE: Self = Self(0);

    pub const SCHEME: Self = Self(1 << 0);
    pub const USER_NAME: Self = Self(1 << 1);
    pub const PASSWORD: Self = Self(1 << 2);
    pub const HOST: Self = Self(1 << 3);
    pub const PORT: Self = Self(1 << 4);
    pub const PARAMETERS: Self = Self(1 << 5);
    pub const HEADERS: Self = Self(1 << 6);
    pub const MADDR: Self = Self(1 << 7);
    pub const TTL: Self = Self(1 << 8);
    pub const TRANSPORT: Self = Self(1 << 9);
    pub const METHOD: Self = Self(1 << 10);
    pub const LR: Self = Self(1 << 11);
    pub const USER_PARAM: Self = Self(1 << 12);

    /// Selects `scheme "://"` instead of `scheme ":"` in composites.
    const HTTP_FORM: Self = Self(1 << 31);

    pub const QUERY: Self = Self::HEADERS;
    pub const USER_INFO: Self = Self(Self::USER_NAME.0 | Self::PASSWORD.0);
    pub const HOST_PORT: Self = Self(Self::HOST.0 | Self::PORT.0);
    pub const SCHEME_AND_SERVER: Self = Self(Self::SCHEME.0 | Self::HOST_PORT.0);
    pub const STRONG_AUTHORITY: Self = Self(Self::USER_INFO.0 | Self::HOST_PORT.0);
    pub const PATH_AND_QUERY: Self = Self(Self::PARAMETERS.0 | Self::HEADERS.0);
    pub const HTTP_REQUEST_URL: Self =
        Self(Self::HTTP_FORM.0 | Self::SCHEME_AND_SERVER.0 | Self::PATH_AND_QUERY.0);
    pub const ABSOLUTE_URI: Self =
        Self(Self::SCHEME.0 | Self::STRONG_AUTHORITY.0 | Self::PATH_AND_QUERY.0);
    pub const SERIALIZATION_INFO_STRING: Self = Self::ABSOLUTE_URI;

    /// The individually extractable parameter components.
    pub const KNOWN_PARAMETERS: [Self; 6] = [
        Self::MADDR,
        Self::TTL,
        Self::TRANSPORT,
        Self::METHOD,
        Self::LR,
        Self::USER_PARAM,
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` when exactly one primitive component bit is set.
    pub const fn is_primitive(self) -> bool {
        self.0 & Self::HTTP_FORM.0 == 0 && self.0.count_ones() == 1
    }

    pub(crate) const fn is_http_form(self) -> bool {
        self.0 & Self::HTTP_FORM.0 != 0
    }

    /// Parameter name for the individually extractable parameter components.
    pub fn parameter_name(self) -> Option<&'static str> {
        match self {
            Self::MADDR => Some("maddr"),
            Self::TTL => Some("ttl"),
            Self::TRANSPORT => Some("transport"),
            Self::METHOD => Some("method"),
            Self::LR => Some("lr"),
            Self::USER_PARAM => Some("user"),
            _ => None,
        }
    }
}

impl BitOr for SipUriComponents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SipUriComponents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SipUriComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SipUriComponents({:#x})", self.0)
    }
}
