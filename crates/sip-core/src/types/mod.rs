//! Value types of the SIP URI model.

pub mod header;
pub mod param;
pub mod uri;

pub use header::{HeaderField, HeaderFieldCollection};
pub use param::{SipParameter, SipUriParameterCollection};
pub use uri::{Scheme, SipUri};
