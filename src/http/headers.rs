//! HTTP header collection.
//!
//! Headers are stored in insertion order with names upper-cased at
//! insert time, which makes every lookup case-insensitive and keeps the
//! wire serialization in the form the server emits. Multiple values for
//! the same name are preserved in arrival order.

use std::fmt;

/// Order-preserving header multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    /// Insert a header. The name is stored upper-cased; an existing name
    /// gains another value rather than being replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_uppercase();
        self.entries.push((name, value.into()));
    }

    /// First value for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_uppercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let name = name.to_ascii_uppercase();
        self.entries
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// How many times `name` occurs.
    pub fn count(&self, name: &str) -> usize {
        let name = name.to_ascii_uppercase();
        self.entries.iter().filter(|(n, _)| *n == name).count()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_ascii_uppercase();
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(stored_name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Split a header-shaped line into name and value.
    ///
    /// The name is everything before the first colon, taken verbatim; the
    /// value has leading and trailing spaces and tabs stripped. Returns
    /// `None` when the line has no colon.
    pub fn split_header_line(line: &str) -> Option<(&str, &str)> {
        let (name, value) = line.split_once(':')?;
        Some((name, value.trim_matches([' ', '\t'])))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
