//! Extension Registry
//!
//! `$FUNC{}`, `$HEAD{}` and `<<inclfunc>>` delegate to collaborators
//! outside the engine. Instead of loading code by name at runtime, callers
//! register those collaborators here once at startup and pass the registry
//! through [`ResolveOptions`](super::ResolveOptions) or the parser.

use std::collections::HashMap;
use std::fmt;

use log::debug;

use crate::document::Document;
use crate::error::{ExtensionError, Result, WclError};

/// Function behind `$FUNC{name,arg1,...}`: string arguments in, string out.
pub type StringFunction =
    Box<dyn Fn(&[String]) -> std::result::Result<String, ExtensionError> + Send + Sync>;

/// Function behind `<<inclfunc name(arg1,...)>>`: resolved arguments in,
/// a document to merge out.
pub type IncludeFunction = Box<
    dyn Fn(&HashMap<String, String>) -> std::result::Result<Document, ExtensionError> + Send + Sync,
>;

/// Reads a single header keyword from a data file (`$HEAD{file,KEY,...}`).
pub trait HeaderReader: Send + Sync {
    fn read_header(&self, file: &str, key: &str) -> std::result::Result<String, ExtensionError>;
}

/// Table of named extension functions and the optional header reader.
///
/// # Example
///
/// ```
/// use wclkit::resolve::Registry;
///
/// let mut registry = Registry::new();
/// registry.register_function("util.upper", |args| {
///     Ok(args.join(",").to_uppercase())
/// });
/// assert!(registry.has_function("util.upper"));
/// ```
#[derive(Default)]
pub struct Registry {
    functions: HashMap<String, StringFunction>,
    include_functions: HashMap<String, IncludeFunction>,
    header_reader: Option<Box<dyn HeaderReader>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `$FUNC` function under its full `module.func` name.
    pub fn register_function<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[String]) -> std::result::Result<String, ExtensionError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Box::new(func));
    }

    /// Registers an `inclfunc` function under its full `module.func` name.
    pub fn register_include_function<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&HashMap<String, String>) -> std::result::Result<Document, ExtensionError>
            + Send
            + Sync
            + 'static,
    {
        self.include_functions.insert(name.into(), Box::new(func));
    }

    pub fn set_header_reader(&mut self, reader: impl HeaderReader + 'static) {
        self.header_reader = Some(Box::new(reader));
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn has_include_function(&self, name: &str) -> bool {
        self.include_functions.contains_key(name)
    }

    /// Calls a `$FUNC` function.
    pub fn call_function(&self, name: &str, args: &[String]) -> Result<String> {
        let func = self
            .functions
            .get(name)
            .ok_or_else(|| WclError::UnknownFunction {
                name: name.to_string(),
            })?;

        debug!("Calling function {}({:?})", name, args);
        func(args).map_err(|source| WclError::Extension {
            name: name.to_string(),
            source,
        })
    }

    /// Calls an `inclfunc` function.
    pub fn call_include_function(
        &self,
        name: &str,
        args: &HashMap<String, String>,
    ) -> Result<Document> {
        let func = self
            .include_functions
            .get(name)
            .ok_or_else(|| WclError::UnknownFunction {
                name: name.to_string(),
            })?;

        debug!("Calling include function {} with {} arguments", name, args.len());
        func(args).map_err(|source| WclError::Extension {
            name: name.to_string(),
            source,
        })
    }

    /// Reads each of `keys` from `file` through the header reader.
    pub fn read_headers(&self, file: &str, keys: &[&str]) -> Result<Vec<String>> {
        let reader = self
            .header_reader
            .as_ref()
            .ok_or_else(|| WclError::NoHeaderReader {
                spec: std::iter::once(file).chain(keys.iter().copied()).collect::<Vec<_>>().join(","),
            })?;

        keys.iter()
            .map(|key| {
                reader
                    .read_header(file, key)
                    .map_err(|source| WclError::Extension {
                        name: format!("header {}[{}]", file, key),
                        source,
                    })
            })
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        let mut include_functions: Vec<&String> = self.include_functions.keys().collect();
        include_functions.sort();

        f.debug_struct("Registry")
            .field("functions", &functions)
            .field("include_functions", &include_functions)
            .field("header_reader", &self.header_reader.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedHeaders;

    impl HeaderReader for FixedHeaders {
        fn read_header(&self, file: &str, key: &str) -> std::result::Result<String, ExtensionError> {
            match key {
                "BAND" => Ok("g".to_string()),
                "EXPNUM" => Ok("229234".to_string()),
                _ => Err(format!("{} has no {}", file, key).into()),
            }
        }
    }

    #[test]
    fn test_call_registered_function() {
        let mut registry = Registry::new();
        registry.register_function("util.join", |args| Ok(args.join("-")));

        let result = registry
            .call_function("util.join", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(result, "a-b");
    }

    #[test]
    fn test_unknown_function() {
        let registry = Registry::new();
        let err = registry.call_function("nope.nothing", &[]).unwrap_err();
        assert!(matches!(err, WclError::UnknownFunction { ref name } if name == "nope.nothing"));
    }

    #[test]
    fn test_function_failure_is_wrapped() {
        let mut registry = Registry::new();
        registry.register_function("util.fail", |_| Err("boom".into()));

        let err = registry.call_function("util.fail", &[]).unwrap_err();
        assert!(matches!(err, WclError::Extension { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_include_function() {
        let mut registry = Registry::new();
        registry.register_include_function("meta.lookup", |args| {
            let mut doc = Document::new();
            doc.insert("expnum", args.get("expnum").cloned().unwrap_or_default());
            Ok(doc)
        });

        let mut args = HashMap::new();
        args.insert("expnum".to_string(), "42".to_string());
        let doc = registry.call_include_function("meta.lookup", &args).unwrap();
        assert_eq!(doc.get_local("expnum").and_then(|v| v.as_str()), Some("42"));
    }

    #[test]
    fn test_read_headers() {
        let mut registry = Registry::new();
        registry.set_header_reader(FixedHeaders);

        let values = registry.read_headers("img.fits", &["BAND", "EXPNUM"]).unwrap();
        assert_eq!(values, vec!["g", "229234"]);
        assert!(registry.read_headers("img.fits", &["AIRMASS"]).is_err());
    }

    #[test]
    fn test_read_headers_without_reader() {
        let registry = Registry::new();
        let err = registry.read_headers("img.fits", &["BAND"]).unwrap_err();
        assert!(matches!(err, WclError::NoHeaderReader { ref spec } if spec == "img.fits,BAND"));
    }

    #[test]
    fn test_debug_lists_names() {
        let mut registry = Registry::new();
        registry.register_function("b.f", |_| Ok(String::new()));
        registry.register_function("a.f", |_| Ok(String::new()));
        let text = format!("{:?}", registry);
        assert!(text.contains(r#"["a.f", "b.f"]"#));
    }
}
