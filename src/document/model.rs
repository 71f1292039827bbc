//! WCL Document Model
//!
//! A [`Document`] is an ordered mapping from keys to [`Value`]s, where a
//! value is either a scalar string or a nested section. Numeric and boolean
//! interpretation is left to whoever reads a value.
//!
//! # Example WCL
//!
//! ```text
//! <current>
//!     curr_module = detrend
//! </current>
//! <module detrend>
//!     execname = detrend_exe
//!     band = g,r,i
//! </module>
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Result, WclError};

/// Reserved top-level key holding the current-value overrides.
pub const CURRENT_KEY: &str = "current";

/// A single entry value inside a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A plain string value (`key = value`)
    Scalar(String),

    /// A nested section (`<key> ... </key>`)
    Section(Document),
}

impl Value {
    /// Returns the string if this is a scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Section(_) => None,
        }
    }

    /// Returns the nested document if this is a section.
    pub fn as_section(&self) -> Option<&Document> {
        match self {
            Value::Section(doc) => Some(doc),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_section_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Section(doc) => Some(doc),
            Value::Scalar(_) => None,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Value::Section(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Section(doc)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Scalar(s) => serializer.serialize_str(s),
            Value::Section(doc) => doc.serialize(serializer),
        }
    }
}

/// Ordered, nested WCL document.
///
/// Entries keep their insertion order. Literal access goes through
/// [`Document::get_local`] and [`Document::insert`]; scoped lookup that
/// honours `current` and the search order goes through
/// [`Document::search`](crate::document::Document::search).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
    search_order: Vec<String>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document from `(key, value)` pairs, keeping their order.
    ///
    /// # Example
    ///
    /// ```
    /// use wclkit::document::{Document, Value};
    ///
    /// let doc = Document::from_pairs(vec![("x", Value::from("5"))]);
    /// assert_eq!(doc.get_local("x").and_then(Value::as_str), Some("5"));
    /// ```
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut doc = Self::new();
        for (key, value) in pairs {
            doc.insert(key, value);
        }
        doc
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Literal lookup of a top-level key (no scoping, no case folding).
    pub fn get_local(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_local_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Literal membership test of a top-level key.
    pub fn contains_local(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Returns the nested section stored directly under `key`.
    pub fn section(&self, key: &str) -> Option<&Document> {
        self.get_local(key).and_then(Value::as_section)
    }

    pub fn section_mut(&mut self, key: &str) -> Option<&mut Document> {
        self.get_local_mut(key).and_then(Value::as_section_mut)
    }

    /// Inserts or overwrites a top-level entry.
    ///
    /// Overwriting keeps the entry's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Returns the section under `key`, creating it when absent.
    ///
    /// A scalar already stored under `key` is replaced by an empty section.
    pub fn section_entry(&mut self, key: &str) -> &mut Document {
        let index = match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => {
                if !self.entries[index].1.is_section() {
                    self.entries[index].1 = Value::Section(Document::new());
                }
                index
            }
            None => {
                self.entries
                    .push((key.to_string(), Value::Section(Document::new())));
                self.entries.len() - 1
            }
        };

        match &mut self.entries[index].1 {
            Value::Section(doc) => doc,
            Value::Scalar(_) => unreachable!("entry was just made a section"),
        }
    }

    /// Sets a value, following dotted section notation (`a.b.c`).
    ///
    /// Every segment before the last must already exist as a section,
    /// otherwise [`WclError::KeyNotFound`] is returned.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut segments: Vec<&str> = key.split('.').collect();
        let last = segments.pop().unwrap_or(key);

        let mut target = self;
        for segment in segments {
            target = target
                .section_mut(segment)
                .ok_or_else(|| WclError::KeyNotFound {
                    key: segment.to_string(),
                })?;
        }

        target.insert(last, value);
        Ok(())
    }

    /// Recursively merges `other` into this document.
    ///
    /// Sections present on both sides merge key by key; scalars from
    /// `other` overwrite; keys only in `other` are appended.
    pub fn update(&mut self, other: Document) {
        for (key, value) in other.entries {
            match value {
                Value::Section(incoming) => self.section_entry(&key).update(incoming),
                scalar => self.insert(key, scalar),
            }
        }
    }

    pub fn search_order(&self) -> &[String] {
        &self.search_order
    }

    /// Sets the ordered list of sections consulted by scoped lookup.
    pub fn set_search_order<I, S>(&mut self, order: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_order = order.into_iter().map(Into::into).collect();
    }

    /// The reserved `current` section, if present.
    pub fn current(&self) -> Option<&Document> {
        self.section(CURRENT_KEY)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Document {
        let mut inner = Document::new();
        inner.insert("c", "1");
        let mut mid = Document::new();
        mid.insert("b", inner);
        let mut doc = Document::new();
        doc.insert("a", mid);
        doc
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut doc = Document::new();
        doc.insert("zeta", "1");
        doc.insert("alpha", "2");
        doc.insert("mid", "3");
        doc.insert("zeta", "4");

        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(doc.get_local("zeta"), Some(&Value::from("4")));
    }

    #[test]
    fn test_set_dotted_path() {
        let mut doc = nested();
        doc.set("a.b.c", "2").unwrap();
        doc.set("a.b.d", "3").unwrap();

        let inner = doc.section("a").unwrap().section("b").unwrap();
        assert_eq!(inner.get_local("c").and_then(Value::as_str), Some("2"));
        assert_eq!(inner.get_local("d").and_then(Value::as_str), Some("3"));
    }

    #[test]
    fn test_set_missing_segment_fails() {
        let mut doc = nested();
        let err = doc.set("a.missing.c", "2").unwrap_err();
        assert!(matches!(err, WclError::KeyNotFound { ref key } if key == "missing"));
    }

    #[test]
    fn test_set_plain_key() {
        let mut doc = Document::new();
        doc.set("x", "5").unwrap();
        assert_eq!(doc.get_local("x").and_then(Value::as_str), Some("5"));
    }

    #[test]
    fn test_update_merges_sections() {
        let mut base = nested();
        base.insert("top", "old");

        let mut other_inner = Document::new();
        other_inner.insert("d", "9");
        let mut other_mid = Document::new();
        other_mid.insert("b", other_inner);
        let mut other = Document::new();
        other.insert("a", other_mid);
        other.insert("top", "new");
        other.insert("extra", "x");

        base.update(other);

        let inner = base.section("a").unwrap().section("b").unwrap();
        assert_eq!(inner.get_local("c").and_then(Value::as_str), Some("1"));
        assert_eq!(inner.get_local("d").and_then(Value::as_str), Some("9"));
        assert_eq!(base.get_local("top").and_then(Value::as_str), Some("new"));
        assert_eq!(base.get_local("extra").and_then(Value::as_str), Some("x"));
    }

    #[test]
    fn test_section_entry_creates_and_reuses() {
        let mut doc = Document::new();
        doc.section_entry("a").insert("k", "v");
        doc.section_entry("a").insert("k2", "v2");

        assert_eq!(doc.len(), 1);
        assert_eq!(doc.section("a").unwrap().len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut doc = nested();
        assert!(doc.remove("a").is_some());
        assert!(doc.is_empty());
        assert!(doc.remove("a").is_none());
    }

    #[test]
    fn test_serialize_as_json_map() {
        let mut doc = nested();
        doc.insert("x", "5");
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"a":{"b":{"c":"1"}},"x":"5"}"#);
    }
}
