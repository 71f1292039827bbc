//! WCL Parser
//!
//! Builds a [`Document`] from WCL markup. Supported line forms:
//!
//! - `# comment` (anything after `#` is dropped)
//! - a trailing `\` joins the line with the next physical line
//! - `<<include path>>` parses another file and merges it into the root
//! - `<<inclfunc module.func(arg1,arg2)>>` merges the result of a registered function
//! - `<tag>` / `<tag sublabel>` opens one or two nested sections
//! - `</tag>` closes the innermost section (or a `<tag sublabel>` pair)
//! - `key = value` or `key value` assigns a scalar
//!
//! Keys are lower-cased except inside `cmdline` and `replace` sections.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::model::Document;
use crate::error::{Result, WclError};
use crate::resolve::{replace_vars_single, Registry, ResolveOptions};

/// Deepest chain of nested `<<include>>` files accepted.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Sections whose keys keep their original case.
const CASE_PRESERVING: &[&str] = &["cmdline", "replace"];

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*<<\s*include\s+(\S+?)\s*>>\s*$").expect("valid include pattern")
});

static INCLFUNC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*<<\s*inclfunc\s+([^\s(]+)\(([^)]*)\)\s*>>\s*$").expect("valid inclfunc pattern")
});

static CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*</\s*([^\s<>]+)\s*>\s*$").expect("valid close pattern"));

static OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*<\s*([^\s<>/]+)(?:\s+([^\s<>]+))?\s*>\s*$").expect("valid open pattern")
});

static KEY_EQ_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^\s=]+)\s*=\s*(.+)$").expect("valid assignment pattern"));

static KEY_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\S+)\s+([^=\s].*)$").expect("valid key/value pattern"));

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("valid environment variable pattern")
});

/// Configurable WCL parser.
///
/// # Example
///
/// ```
/// use wclkit::document::Parser;
///
/// let doc = Parser::new().parse_str("<a>\nb = 1\n</a>\n").unwrap();
/// let a = doc.section("a").unwrap();
/// assert_eq!(a.get_local("b").and_then(|v| v.as_str()), Some("1"));
/// ```
#[derive(Debug, Clone)]
pub struct Parser<'r> {
    registry: Option<&'r Registry>,
    source: String,
    preserve_case: bool,
    depth: usize,
}

impl Default for Parser<'_> {
    fn default() -> Self {
        Self {
            registry: None,
            source: "stdin".to_string(),
            preserve_case: false,
            depth: 0,
        }
    }
}

impl<'r> Parser<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry used for `<<inclfunc>>` and for `$FUNC`/`$HEAD` in include paths.
    pub fn with_registry(mut self, registry: &'r Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Name reported in syntax errors.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source = name.into();
        self
    }

    /// Parses WCL text held in memory.
    pub fn parse_str(&self, text: &str) -> Result<Document> {
        self.parse(text.as_bytes())
    }

    /// Parses a WCL file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| WclError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parser = Self {
            source: path.display().to_string(),
            ..self.clone()
        };
        parser.parse(BufReader::new(file))
    }

    /// Parses WCL from any buffered reader.
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<Document> {
        let mut state = State {
            parser: self,
            root: Document::new(),
            frames: Vec::new(),
            preserve_case: self.preserve_case,
        };

        let mut lines = reader.lines().enumerate();
        let mut last_line = 0;

        while let Some((index, line)) = lines.next() {
            let line_no = index + 1;
            let mut line = line.map_err(|source| self.io_error(source))?;

            while line.trim_end().ends_with('\\') {
                let joined_len = line.trim_end().len() - 1;
                line.truncate(joined_len);
                match lines.next() {
                    Some((_, next)) => line.push_str(&next.map_err(|source| self.io_error(source))?),
                    None => break,
                }
            }

            last_line = line_no;
            state.line(&line, line_no)?;
        }

        state.finish(last_line)
    }

    fn io_error(&self, source: std::io::Error) -> WclError {
        WclError::Io {
            path: PathBuf::from(&self.source),
            source,
        }
    }
}

/// Parses WCL text with a default parser.
pub fn parse_str(text: &str) -> Result<Document> {
    Parser::new().parse_str(text)
}

/// Parses WCL from a reader with a default parser.
pub fn parse<R: BufRead>(reader: R) -> Result<Document> {
    Parser::new().parse(reader)
}

/// Loads a WCL file.
///
/// # Example
///
/// ```rust,no_run
/// use wclkit::document::load_wcl;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let doc = load_wcl("wrapper_input.wcl")?;
///     println!("Loaded {} top-level entries", doc.len());
///     Ok(())
/// }
/// ```
pub fn load_wcl(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    info!("Loading WCL from: {}", path.display());
    let doc = Parser::new().parse_file(path)?;
    debug!("Parsed {} top-level entries", doc.len());
    Ok(doc)
}

/// An open section on the parse stack.
#[derive(Debug)]
struct Frame {
    key: String,

    /// Opened as the second token of `<tag sublabel>`
    sublabel: bool,
}

struct State<'p, 'r> {
    parser: &'p Parser<'r>,
    root: Document,
    frames: Vec<Frame>,
    preserve_case: bool,
}

impl State<'_, '_> {
    fn error(&self, line_no: usize, message: impl Into<String>) -> WclError {
        WclError::syntax(&self.parser.source, line_no, message)
    }

    /// The innermost open section, created on first use.
    fn current(&mut self) -> &mut Document {
        let mut doc = &mut self.root;
        for frame in &self.frames {
            doc = doc.section_entry(&frame.key);
        }
        doc
    }

    fn line(&mut self, raw: &str, line_no: usize) -> Result<()> {
        let line = raw.split('#').next().unwrap_or_default();
        if line.trim().is_empty() {
            return Ok(());
        }
        trace!("{}:{}: {}", self.parser.source, line_no, line.trim());

        if let Some(caps) = INCLUDE.captures(line) {
            return self.include(&caps[1], line_no);
        }

        if let Some(caps) = INCLFUNC.captures(line) {
            return self.inclfunc(&caps[1], &caps[2]);
        }

        if line.trim_start().starts_with("<<") {
            return Err(self.error(line_no, format!("Unparseable directive: {}", line.trim())));
        }

        if let Some(caps) = CLOSE.captures(line) {
            return self.close(&caps[1], line_no);
        }

        if let Some(caps) = OPEN.captures(line) {
            return self.open(&caps, line_no);
        }

        if let Some(caps) = KEY_EQ_VALUE
            .captures(line)
            .or_else(|| KEY_VALUE.captures(line))
        {
            self.assign(&caps[1], &caps[2]);
            return Ok(());
        }

        warn!(
            "Ignoring line #{} of {} (did not match patterns): {}",
            line_no,
            self.parser.source,
            line.trim()
        );
        Ok(())
    }

    fn assign(&mut self, key: &str, value: &str) {
        let key = if self.preserve_case {
            key.to_string()
        } else {
            key.to_lowercase()
        };
        let value = value.trim().to_string();
        self.current().insert(key, value);
    }

    fn open(&mut self, caps: &Captures<'_>, line_no: usize) -> Result<()> {
        let key = caps[1].to_lowercase();

        // usually means a missing '/' on the previous close
        if self.frames.last().is_some_and(|frame| frame.key == key) {
            return Err(self.error(
                line_no,
                format!("found child section with same name ({})", key),
            ));
        }

        if CASE_PRESERVING.contains(&key.as_str()) {
            self.preserve_case = true;
        }

        self.frames.push(Frame {
            key,
            sublabel: false,
        });
        self.current();

        if let Some(label) = caps.get(2) {
            self.frames.push(Frame {
                key: label.as_str().to_lowercase(),
                sublabel: true,
            });
            self.current();
        }
        Ok(())
    }

    fn close(&mut self, tag: &str, line_no: usize) -> Result<()> {
        let key = tag.to_lowercase();
        if CASE_PRESERVING.contains(&key.as_str()) {
            self.preserve_case = false;
        }

        let depth = self.frames.len();
        let Some(top) = self.frames.last() else {
            return Err(self.error(
                line_no,
                format!("Invalid or missing section close. Got close for {} with no open section.", key),
            ));
        };

        if top.key == key {
            self.frames.pop();
            return Ok(());
        }

        if top.sublabel {
            if depth >= 2 && self.frames[depth - 2].key == key {
                self.frames.truncate(depth - 2);
                return Ok(());
            }
            let expected = if depth >= 2 {
                self.frames[depth - 2].key.clone()
            } else {
                top.key.clone()
            };
            return Err(self.error(
                line_no,
                format!(
                    "Invalid or missing section close. Got close for {}. Expecting close for {}.",
                    key, expected
                ),
            ));
        }

        Err(self.error(
            line_no,
            format!(
                "Invalid or missing section close. Got close for {}. Expecting close for {}.",
                key, top.key
            ),
        ))
    }

    /// `<<include path>>`; the included document always merges into the root.
    fn include(&mut self, raw_path: &str, line_no: usize) -> Result<()> {
        let parser = self.parser;
        if parser.depth >= MAX_INCLUDE_DEPTH {
            return Err(self.error(
                line_no,
                format!("Includes nested deeper than {} files at {}", MAX_INCLUDE_DEPTH, raw_path),
            ));
        }

        let mut opts = ResolveOptions::new();
        if let Some(registry) = parser.registry {
            opts = opts.with_registry(registry);
        }
        let resolved = replace_vars_single(raw_path, &self.root, &opts)?;
        let path = expand_path(&resolved);
        debug!("Including {} (line {} of {})", path, line_no, parser.source);

        let child = Parser {
            registry: parser.registry,
            source: path.clone(),
            preserve_case: self.preserve_case,
            depth: parser.depth + 1,
        };
        let included = child.parse_file(&path)?;
        self.root.update(included);
        Ok(())
    }

    /// `<<inclfunc module.func(arg1,...)>>`
    fn inclfunc(&mut self, name: &str, arg_list: &str) -> Result<()> {
        let registry = self.parser.registry.ok_or_else(|| WclError::UnknownFunction {
            name: name.to_string(),
        })?;
        let opts = ResolveOptions::new().with_registry(registry);

        let mut args = HashMap::new();
        for arg in arg_list.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let value = self
                .root
                .getfull(arg, &opts)?
                .ok_or_else(|| WclError::missing(arg))?;
            args.insert(arg.to_string(), value);
        }

        let result = registry.call_include_function(name, &args)?;
        debug!("inclfunc {} returned {} entries", name, result.len());
        self.root.update(result);
        Ok(())
    }

    fn finish(self, last_line: usize) -> Result<Document> {
        if !self.frames.is_empty() {
            let open: Vec<&str> = self.frames.iter().map(|f| f.key.as_str()).collect();
            return Err(self.error(
                last_line,
                format!(
                    "Error parsing WCL. Check that all sections have closing line. Unclosed: {}",
                    open.join(", ")
                ),
            ));
        }
        Ok(self.root)
    }
}

/// Expands a leading `~` and `$VAR` / `${VAR}` from the environment.
///
/// Unset variables are left as written.
pub fn expand_path(path: &str) -> String {
    let path = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            match std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
                Ok(home) => format!("{}{}", home, rest),
                Err(_) => path.to_string(),
            }
        }
        _ => path.to_string(),
    };

    ENV_VAR
        .replace_all(&path, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
