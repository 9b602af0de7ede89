//! # sipmesh-sip-core
//!
//! SIP URI grammar support for the sipmesh stack, following
//! [RFC 3261](https://datatracker.ietf.org/doc/html/rfc3261):
//!
//! - [`syntax`]: character classes and string transforms for the RFC 3261 ABNF
//! - [`parser`]: the component extractor ([`SipStyleUriParser`]) and percent-encoding helpers
//! - [`types`]: [`SipUri`] with RFC 3261 Section 19.1.4 equality, parameter and header collections
//! - [`builder`]: [`SipUriBuilder`], a validating, memoizing URI builder
//!
//! ```rust
//! use sipmesh_sip_core::prelude::*;
//!
//! let uri: SipUri = "sip:bob@biloxi.com;transport=udp;ttl=15".parse().unwrap();
//! assert_eq!(uri.time_to_live().unwrap(), 15);
//!
//! let mut builder = SipUriBuilder::from_uri(&uri).unwrap();
//! builder.set_port(5080).unwrap();
//! assert_eq!(builder.build(), "sip:bob@biloxi.com:5080;transport=udp;ttl=15");
//! ```

pub mod builder;
pub mod error;
pub mod parser;
pub mod syntax;
pub mod types;

pub use builder::SipUriBuilder;
pub use error::{Error, Result};
pub use parser::{SipStyleUriParser, SipUriComponents};
pub use types::{HeaderField, HeaderFieldCollection, Scheme, SipParameter, SipUri, SipUriParameterCollection};

/// Commonly used types.
pub mod prelude {
    pub use crate::builder::SipUriBuilder;
    pub use crate::error::{Error, Result};
    pub use crate::parser::{SipStyleUriParser, SipUriComponents};
    pub use crate::types::{
        HeaderField, HeaderFieldCollection, Scheme, SipParameter, SipUri, SipUriParameterCollection,
    };
}
