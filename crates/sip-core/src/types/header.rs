//! # URI Header Fields
//!
//! The `?hname=hvalue&...` region of a SIP URI
//! ([RFC 3261 Section 19.1.1](https://datatracker.ietf.org/doc/html/rfc3261#section-19.1.1)).
//! Header fields in a URI describe headers to add to a request built from that URI.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One `hname=hvalue` pair from a URI.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    name: String,
    value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parses one `name=value` segment; a missing `=` yields an empty value.
    pub fn parse(segment: &str) -> Self {
        match segment.split_once('=') {
            Some((name, value)) => Self::new(name, value),
            None => Self::new(segment, ""),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

// Field names are case-insensitive, values are compared exactly.
impl PartialEq for HeaderField {
    fn eq(&self, other: &Self) -> bool {
        self.has_name(&other.name) && self.value == other.value
    }
}

impl Hash for HeaderField {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Insertion-ordered collection of [`HeaderField`]s with unique, case-insensitive names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderFieldCollection {
    fields: Vec<HeaderField>,
}

impl HeaderFieldCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `?a=b&c=d` region. The leading `?` is optional.
    pub fn parse(region: &str) -> Result<Self> {
        let region = region.strip_prefix('?').unwrap_or(region);
        let mut collection = Self::new();
        for segment in region.split('&').filter(|s| !s.is_empty()) {
            collection.add(HeaderField::parse(segment))?;
        }
        Ok(collection)
    }

    /// Appends a field; fails with [`Error::DuplicateHeader`] if its name exists.
    pub fn add(&mut self, field: HeaderField) -> Result<()> {
        if self.contains(field.name()) {
            return Err(Error::DuplicateHeader(field.name().to_string()));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderField> {
        let index = self.fields.iter().position(|h| h.has_name(name))?;
        Some(self.fields.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|h| h.has_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Order-independent comparison: same cardinality and every field of `self`
    /// has an equal field in `other` (and vice versa).
    pub fn set_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .all(|h| other.get(h.name()).is_some_and(|o| o == h))
            && other
                .fields
                .iter()
                .all(|h| self.get(h.name()).is_some_and(|s| s == h))
    }
}

impl PartialEq for HeaderFieldCollection {
    fn eq(&self, other: &Self) -> bool {
        self.set_eq(other)
    }
}

impl fmt::Display for HeaderFieldCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            f.write_str(if i == 0 { "?" } else { "&" })?;
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
