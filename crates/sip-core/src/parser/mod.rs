//! URI scanning and component extraction.

pub mod components;
pub mod uri;
pub mod utils;

pub use components::SipUriComponents;
pub use uri::{SipStyleUriParser, UriLayout};
