//! Scoped Lookup
//!
//! Implements the WCL scoping rules used whenever a bare key is looked up.
//! Precedence, highest first:
//!
//! 1. current values (the `current` section, overridden per call)
//! 2. the caller-supplied search object
//! 3. each section named in the search order, using its `curr_<section>`
//!    entry to pick the active sub-section
//! 4. the key as a literal top-level entry
//!
//! A key containing `.` bypasses scoping and is followed as an exact path.

use std::collections::BTreeSet;

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use super::model::{Document, Value};
use crate::error::{Result, WclError};
use crate::resolve::{replace_vars_single, ResolveOptions};

/// Matches required-variable references, capturing `name[:N]`.
static REQUIRED_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid variable pattern"));

/// Per-call options for [`Document::search`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions<'a> {
    /// Overrides for entries of the document's `current` section
    pub current_values: Option<&'a Document>,

    /// Extra mapping consulted after current values
    pub search_obj: Option<&'a Document>,

    /// Fail with [`WclError::MissingKey`] instead of reporting not-found
    pub required: bool,
}

impl<'a> SearchOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a lookup that must succeed.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn with_current_values(mut self, current: &'a Document) -> Self {
        self.current_values = Some(current);
        self
    }

    pub fn with_search_obj(mut self, obj: &'a Document) -> Self {
        self.search_obj = Some(obj);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

impl Document {
    /// Looks up `key` following the scoping rules.
    ///
    /// Returns `Ok(None)` when nothing matches, unless `opts.required` is
    /// set, in which case a [`WclError::MissingKey`] is returned.
    ///
    /// # Example
    ///
    /// ```
    /// use wclkit::document::{parse_str, SearchOptions, Value};
    ///
    /// let text = "<current>\ncurr_module = detrend\n</current>\n\
    ///             <module detrend>\nfoo = bar\n</module>\n";
    /// let mut doc = parse_str(text).unwrap();
    /// doc.set_search_order(["module"]);
    ///
    /// let found = doc.search("foo", &SearchOptions::new()).unwrap();
    /// assert_eq!(found.and_then(Value::as_str), Some("bar"));
    /// ```
    pub fn search<'a>(&'a self, key: &str, opts: &SearchOptions<'a>) -> Result<Option<&'a Value>> {
        let key = key.to_lowercase();

        let found = if key.contains('.') {
            self.search_path(&key)
        } else {
            self.search_scoped(&key, opts)
        };

        trace!("search '{}' -> found={}", key, found.is_some());

        match found {
            Some(value) => Ok(Some(value)),
            None if opts.required => Err(WclError::missing(key)),
            None => Ok(None),
        }
    }

    /// Scoped membership test.
    pub fn contains(&self, key: &str, opts: &SearchOptions<'_>) -> bool {
        let opts = opts.with_required(false);
        matches!(self.search(key, &opts), Ok(Some(_)))
    }

    /// Scoped lookup that never fails; use `unwrap_or` for a default.
    pub fn get<'a>(&'a self, key: &str, opts: &SearchOptions<'a>) -> Option<&'a Value> {
        let opts = opts.with_required(false);
        self.search(key, &opts).ok().flatten()
    }

    /// Scoped lookup of a scalar.
    pub fn get_str<'a>(&'a self, key: &str, opts: &SearchOptions<'a>) -> Option<&'a str> {
        self.get(key, opts).and_then(Value::as_str)
    }

    /// Scoped lookup followed by full variable resolution.
    ///
    /// The value must resolve to exactly one string; loop expansion that
    /// yields several combinations is a [`WclError::AmbiguousExpansion`].
    pub fn getfull(&self, key: &str, opts: &ResolveOptions<'_>) -> Result<Option<String>> {
        let Some(value) = self.search(key, &opts.search)? else {
            return Ok(None);
        };

        let text = value.as_str().ok_or_else(|| WclError::NotScalar {
            key: key.to_string(),
        })?;

        replace_vars_single(text, self, opts).map(Some)
    }

    /// Names of all variables referenced as `${name}` or `${name:N}` in any
    /// scalar of this document, recursively.
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_variables(self, &mut names);
        names
    }

    fn search_path(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let mut value = self.get_local(segments.next()?)?;
        for segment in segments {
            value = value.as_section()?.get_local(segment)?;
        }
        Some(value)
    }

    fn current_value<'a>(&'a self, key: &str, opts: &SearchOptions<'a>) -> Option<&'a Value> {
        opts.current_values
            .and_then(|current| current.get_local(key))
            .or_else(|| self.current().and_then(|current| current.get_local(key)))
    }

    fn search_scoped<'a>(&'a self, key: &str, opts: &SearchOptions<'a>) -> Option<&'a Value> {
        if let Some(value) = self.current_value(key, opts) {
            return Some(value);
        }

        if let Some(value) = opts.search_obj.and_then(|obj| obj.get_local(key)) {
            return Some(value);
        }

        for section in self.search_order() {
            let selector = format!("curr_{}", section);
            let Some(active) = self.current_value(&selector, opts).and_then(Value::as_str) else {
                continue;
            };

            let scoped = self
                .section(section)
                .and_then(|sect| sect.section(active))
                .and_then(|entry| entry.get_local(key));

            if let Some(value) = scoped {
                trace!("'{}' found in {}.{}", key, section, active);
                return Some(value);
            }
        }

        self.get_local(key)
    }
}

fn collect_variables(doc: &Document, names: &mut BTreeSet<String>) {
    for (_, value) in doc.iter() {
        match value {
            Value::Section(section) => collect_variables(section, names),
            Value::Scalar(text) => {
                for caps in REQUIRED_VAR.captures_iter(text) {
                    let name = caps[1].split(':').next().unwrap_or_default();
                    names.insert(name.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a document where `foo` is defined at every precedence level.
    fn layered() -> Document {
        let mut doc = Document::new();

        let mut current = Document::new();
        current.insert("curr_module", "detrend");
        current.insert("foo", "from_current");
        doc.insert("current", current);

        let mut detrend = Document::new();
        detrend.insert("foo", "from_module");
        detrend.insert("bar", "module_bar");
        let mut module = Document::new();
        module.insert("detrend", detrend);
        doc.insert("module", module);

        doc.insert("foo", "from_global");
        doc.insert("bar", "global_bar");
        doc.insert("baz", "global_baz");
        doc.set_search_order(["module"]);
        doc
    }

    #[test]
    fn test_current_values_take_precedence() {
        let doc = layered();
        let found = doc.search("foo", &SearchOptions::new()).unwrap();
        assert_eq!(found.and_then(Value::as_str), Some("from_current"));
    }

    #[test]
    fn test_current_value_overrides_from_options() {
        let doc = layered();
        let mut overrides = Document::new();
        overrides.insert("foo", "from_override");
        let opts = SearchOptions::new().with_current_values(&overrides);
        assert_eq!(doc.get_str("foo", &opts), Some("from_override"));
    }

    #[test]
    fn test_search_obj_beats_search_order() {
        let doc = layered();
        let mut obj = Document::new();
        obj.insert("bar", "from_obj");
        let opts = SearchOptions::new().with_search_obj(&obj);
        assert_eq!(doc.get_str("bar", &opts), Some("from_obj"));
    }

    #[test]
    fn test_search_order_beats_global() {
        let doc = layered();
        assert_eq!(doc.get_str("bar", &SearchOptions::new()), Some("module_bar"));
    }

    #[test]
    fn test_global_fallback() {
        let doc = layered();
        assert_eq!(doc.get_str("baz", &SearchOptions::new()), Some("global_baz"));
    }

    #[test]
    fn test_search_order_first_match_wins() {
        let mut doc = layered();
        let mut wide = Document::new();
        wide.insert("bar", "block_bar");
        let mut block = Document::new();
        block.insert("wide", wide);
        doc.insert("block", block);
        doc.set_search_order(["block", "module"]);

        let mut overrides = Document::new();
        overrides.insert("curr_block", "wide");
        let opts = SearchOptions::new().with_current_values(&overrides);
        assert_eq!(doc.get_str("bar", &opts), Some("block_bar"));

        doc.set_search_order(["module", "block"]);
        assert_eq!(doc.get_str("bar", &opts), Some("module_bar"));
    }

    #[test]
    fn test_section_without_selector_is_skipped() {
        let mut doc = layered();
        doc.remove("current");
        assert_eq!(doc.get_str("bar", &SearchOptions::new()), Some("global_bar"));
    }

    #[test]
    fn test_dotted_key_is_exact() {
        let doc = layered();
        let found = doc.search("module.detrend.foo", &SearchOptions::new()).unwrap();
        assert_eq!(found.and_then(Value::as_str), Some("from_module"));

        let missing = doc.search("module.other.foo", &SearchOptions::new()).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_key_is_case_folded() {
        let doc = layered();
        assert_eq!(doc.get_str("BAZ", &SearchOptions::new()), Some("global_baz"));
    }

    #[test]
    fn test_required_missing_key() {
        let doc = layered();
        let err = doc.search("nope", &SearchOptions::required()).unwrap_err();
        assert!(matches!(err, WclError::MissingKey { ref key } if key == "nope"));
        assert!(!doc.contains("nope", &SearchOptions::required()));
    }

    #[test]
    fn test_contains() {
        let doc = layered();
        assert!(doc.contains("bar", &SearchOptions::new()));
        assert!(doc.contains("module.detrend", &SearchOptions::new()));
    }

    #[test]
    fn test_getfull_resolves_variables() {
        let mut doc = Document::new();
        doc.insert("ccd", "7");
        doc.insert("filename", "img_${ccd:2}.fits");

        let value = doc.getfull("filename", &ResolveOptions::new()).unwrap();
        assert_eq!(value.as_deref(), Some("img_07.fits"));
        assert_eq!(doc.getfull("absent", &ResolveOptions::new()).unwrap(), None);
    }

    #[test]
    fn test_getfull_rejects_sections() {
        let doc = layered();
        let err = doc.getfull("module", &ResolveOptions::new()).unwrap_err();
        assert!(matches!(err, WclError::NotScalar { .. }));
    }

    #[test]
    fn test_referenced_variables() {
        let mut doc = Document::new();
        doc.insert("a", "${x}/${y:3}");
        let mut inner = Document::new();
        inner.insert("b", "$opt{ignored} ${z}");
        doc.insert("inner", inner);

        let names: Vec<String> = doc.referenced_variables().into_iter().collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }
}
