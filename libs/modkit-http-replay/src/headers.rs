//! Ordered header multimap used by stored responses.

use crate::error::ReplayError;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Headers that describe the body rather than the response as a whole.
const CONTENT_HEADERS: &[&str] = &[
    "allow",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-length",
    "content-location",
    "content-md5",
    "content-range",
    "content-type",
    "expires",
    "last-modified",
];

/// Returns `true` if `name` belongs with the body (`Content-*`, `Expires`, ...).
#[must_use]
pub fn is_content_header(name: &str) -> bool {
    CONTENT_HEADERS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Ordered multimap from header name to one or more values.
///
/// Lookup is case-insensitive; the casing of the first insertion is kept so
/// names round-trip through storage unchanged. A name never maps to an empty
/// value list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMultimap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMultimap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    /// Append a value, creating the entry if needed.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace all values for `name`. An empty `values` removes the entry.
    pub fn insert<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.remove(&name);
            return;
        }
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// Remove an entry, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name)
            .map(|idx| self.entries.remove(idx).1)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.position(name)
            .map(|idx| self.entries[idx].1.as_slice())
    }

    /// First value for `name`.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split a flat `http` header map into `(response, content)` multimaps.
    ///
    /// Values that are not valid UTF-8 are stored lossily, with a `debug!`
    /// event naming the header.
    #[must_use]
    pub fn split_header_map(headers: &HeaderMap) -> (Self, Self) {
        let mut response = Self::new();
        let mut content = Self::new();
        for (name, value) in headers {
            let value = match std::str::from_utf8(value.as_bytes()) {
                Ok(text) => text.to_owned(),
                Err(_) => {
                    tracing::debug!(
                        header = %name,
                        "header value is not valid UTF-8; storing it lossily"
                    );
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                }
            };
            if is_content_header(name.as_str()) {
                content.append(name.as_str(), value);
            } else {
                response.append(name.as_str(), value);
            }
        }
        (response, content)
    }

    /// Append every value into an `http` header map.
    ///
    /// # Errors
    /// Returns an error if a stored name or value is not valid for HTTP.
    pub fn write_into(&self, headers: &mut HeaderMap) -> Result<(), ReplayError> {
        for (name, values) in &self.entries {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            for value in values {
                headers.append(name.clone(), HeaderValue::from_bytes(value.as_bytes())?);
            }
        }
        Ok(())
    }
}

impl Serialize for HeaderMultimap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

struct MultimapVisitor;

impl<'de> Visitor<'de> for MultimapVisitor {
    type Value = HeaderMultimap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of header name to an array of values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut headers = HeaderMultimap::new();
        while let Some((name, values)) = access.next_entry::<String, Vec<String>>()? {
            headers.insert(name, values);
        }
        Ok(headers)
    }
}

impl<'de> Deserialize<'de> for HeaderMultimap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MultimapVisitor)
    }
}
