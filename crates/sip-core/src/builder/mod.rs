//! Builders for SIP protocol values.

mod uri;

pub use uri::SipUriBuilder;
