//! # SIP URI Parameters
//!
//! Ordered parameter storage for the `;name=value` region of a SIP URI
//! ([RFC 3261 Section 19.1.1](https://datatracker.ietf.org/doc/html/rfc3261#section-19.1.1)).
//!
//! Names are looked up case-insensitively while the original spelling is kept for
//! serialization. A collection never holds two parameters whose names differ only
//! by case.
//!
//! ## Examples
//!
//! ```rust
//! use sipmesh_sip_core::types::param::{SipParameter, SipUriParameterCollection};
//!
//! let mut params = SipUriParameterCollection::new();
//! params.add(SipParameter::new("transport", "tcp")).unwrap();
//! params.add(SipParameter::flag("lr")).unwrap();
//!
//! assert_eq!(params.get("TRANSPORT"), Some("tcp"));
//! assert_eq!(params.to_string(), ";transport=tcp;lr");
//! assert!(params.add(SipParameter::new("Transport", "udp")).is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single `name[=value]` URI parameter. An empty value means the parameter
/// was given bare (`;lr`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SipParameter {
    name: String,
    value: String,
}

impl SipParameter {
    /// Creates a parameter with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Creates a bare parameter such as `lr`.
    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, String::new())
    }

    /// Parses one `name[=value]` segment (without the leading `;`).
    pub fn parse(segment: &str) -> Self {
        match segment.split_once('=') {
            Some((name, value)) => Self::new(name, value),
            None => Self::flag(segment),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// `true` when the parameter carries no value.
    pub fn is_flag(&self) -> bool {
        self.value.is_empty()
    }

    /// Case-insensitive name match.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Lookup key: the upper-cased name.
    pub fn key(&self) -> String {
        self.name.to_ascii_uppercase()
    }
}

impl fmt::Display for SipParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}={}", self.name, self.value)
        }
    }
}

/// Insertion-ordered set of [`SipParameter`]s keyed by case-insensitive name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipUriParameterCollection {
    params: Vec<SipParameter>,
}

impl SipUriParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `;a=b;c` region. The leading `;` is optional.
    ///
    /// Fails with [`Error::DuplicateParameter`] if a name repeats.
    pub fn parse(region: &str) -> Result<Self> {
        let mut collection = Self::new();
        for segment in region.split(';').filter(|s| !s.is_empty()) {
            collection.add(SipParameter::parse(segment))?;
        }
        Ok(collection)
    }

    /// Appends a parameter; its name must not already be present.
    pub fn add(&mut self, param: SipParameter) -> Result<()> {
        if self.contains(param.name()) {
            return Err(Error::DuplicateParameter(param.name().to_string()));
        }
        self.params.push(param);
        Ok(())
    }

    /// Replaces the value of an existing parameter in place, or appends it.
    pub fn set(&mut self, param: SipParameter) {
        match self.params.iter_mut().find(|p| p.has_name(param.name())) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    /// Removes the named parameter, returning it if it was present.
    pub fn remove(&mut self, name: &str) -> Option<SipParameter> {
        let index = self.params.iter().position(|p| p.has_name(name))?;
        Some(self.params.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_parameter(name).map(SipParameter::value)
    }

    pub fn get_parameter(&self, name: &str) -> Option<&SipParameter> {
        self.params.iter().find(|p| p.has_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_parameter(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SipParameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }
}

impl fmt::Display for SipUriParameterCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for param in &self.params {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SipUriParameterCollection {
    type Item = &'a SipParameter;
    type IntoIter = std::slice::Iter<'a, SipParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_display() {
        assert_eq!(SipParameter::new("transport", "tcp").to_string(), "transport=tcp");
        assert_eq!(SipParameter::flag("lr").to_string(), "lr");
        assert_eq!(SipParameter::parse("ttl=15").value(), "15");
        assert!(SipParameter::parse("lr").is_flag());
    }

    #[test]
    fn test_case_insensitive_lookup_preserves_case() {
        let params = SipUriParameterCollection::parse(";Transport=TCP;LR").unwrap();
        assert_eq!(params.get("transport"), Some("TCP"));
        assert!(params.contains("lr"));
        assert_eq!(params.to_string(), ";Transport=TCP;LR");
    }

    #[test]
    fn test_duplicate_detection() {
        let err = SipUriParameterCollection::parse(";lr;LR").unwrap_err();
        assert_eq!(err, Error::DuplicateParameter("LR".to_string()));
    }

    #[test]
    fn test_set_and_remove() {
        let mut params = SipUriParameterCollection::parse("ttl=1;lr").unwrap();
        params.set(SipParameter::new("TTL", "2"));
        assert_eq!(params.to_string(), ";TTL=2;lr");
        assert_eq!(params.remove("ttl").map(|p| p.value().to_string()), Some("2".into()));
        assert!(params.remove("ttl").is_none());
        assert_eq!(params.len(), 1);
    }
}
