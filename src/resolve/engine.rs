//! Variable Resolution Engine
//!
//! Expands the inline variable forms of WCL text against a [`Document`]:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `${name}` / `${name:N}` | required lookup, optionally zero-padded to N digits |
//! | `$opt{name}` / `$opt{name:N}` | like `${}`, but a missing key becomes `""` |
//! | `$HEAD{file,KEY1,KEY2}` | header values read through the registry, comma-joined |
//! | `$FUNC{module.func,arg1,...}` | result of a registered function |
//! | `$LOOP{name}` / `$LOOP{name:N}` | one branch per value of `name` |
//!
//! `$HEAD`, `$opt` and `${}` are substituted repeatedly until the text stops
//! changing, then `$FUNC` gets its own fixed-point pass. Any `$LOOP` left
//! over is expanded into one text per combination of values.

use std::collections::BTreeMap;

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use super::expand::{expand_loops, has_loops};
use super::registry::Registry;
use crate::document::{Document, SearchOptions};
use crate::error::{Result, WclError};

/// Cap on fixed-point passes and on substitutions per form within a pass.
pub const MAX_SUBSTITUTION_PASSES: usize = 100;

/// Variable name to the concrete value it was resolved to.
pub type Bindings = BTreeMap<String, String>;

static HEAD_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$HEAD\{([^$}]+)\}").expect("valid $HEAD pattern"));
static OPT_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$opt\{([^$}]+)\}").expect("valid $opt pattern"));
static REQ_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^$}]+)\}").expect("valid ${} pattern"));
static FUNC_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$FUNC\{([^$}]+)\}").expect("valid $FUNC pattern"));

/// Options controlling a resolution request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions<'a> {
    /// Options passed to every [`Document::search`]
    pub search: SearchOptions<'a>,

    /// Defer multi-valued variables to `$LOOP{}` and expand them
    pub expand: bool,

    /// Collaborators for `$FUNC` and `$HEAD`
    pub registry: Option<&'a Registry>,
}

impl<'a> ResolveOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn with_search(mut self, search: SearchOptions<'a>) -> Self {
        self.search = search;
        self
    }

    pub fn with_registry(mut self, registry: &'a Registry) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// One concrete text together with the variable values that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    pub bindings: Bindings,
}

/// Result of [`replace_vars`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// No loop expansion happened
    Single(Expansion),

    /// One entry per combination of loop values, in expansion order
    Expanded(Vec<Expansion>),
}

impl Resolved {
    /// Number of concrete texts produced.
    pub fn len(&self) -> usize {
        match self {
            Resolved::Single(_) => 1,
            Resolved::Expanded(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_expansions(self) -> Vec<Expansion> {
        match self {
            Resolved::Single(item) => vec![item],
            Resolved::Expanded(items) => items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Header,
    Optional,
    Required,
    Function,
}

impl Form {
    fn pattern(self) -> &'static Regex {
        match self {
            Form::Header => &*HEAD_VAR,
            Form::Optional => &*OPT_VAR,
            Form::Required => &*REQ_VAR,
            Form::Function => &*FUNC_VAR,
        }
    }
}

/// Variables whose values are being resolved further up the call chain.
#[derive(Debug, Default)]
struct Context {
    active: Vec<String>,
}

impl Context {
    fn enter(&mut self, name: &str, text: &str) -> Result<()> {
        if self.active.iter().any(|n| n == name) {
            return Err(WclError::LoopGuardExceeded {
                text: text.to_string(),
            });
        }
        self.active.push(name.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.active.pop();
    }
}

/// Replaces every variable form in `text`.
///
/// Returns [`Resolved::Single`] when no loop expansion took place and
/// [`Resolved::Expanded`] otherwise, so callers can tell one concrete value
/// from one value per combination. A loop variable with no values (such as
/// an empty range) leaves its `$LOOP{}` token in a single result.
///
/// # Example
///
/// ```
/// use wclkit::document::{Document, Value};
/// use wclkit::resolve::{replace_vars, ResolveOptions};
///
/// let doc = Document::from_pairs(vec![("band", Value::from("g,r,i"))]);
/// let opts = ResolveOptions::new().with_expand(true);
///
/// let texts: Vec<String> = replace_vars("${band}", &doc, &opts)
///     .unwrap()
///     .into_expansions()
///     .into_iter()
///     .map(|e| e.text)
///     .collect();
/// assert_eq!(texts, vec!["g", "r", "i"]);
/// ```
pub fn replace_vars(text: &str, doc: &Document, opts: &ResolveOptions<'_>) -> Result<Resolved> {
    let mut ctx = Context::default();
    resolve(text, doc, opts, &mut ctx)
}

/// Like [`replace_vars`] but requires exactly one resulting text.
pub fn replace_vars_single(text: &str, doc: &Document, opts: &ResolveOptions<'_>) -> Result<String> {
    let mut ctx = Context::default();
    resolve_single(text, doc, opts, &mut ctx)
}

fn resolve_single(
    text: &str,
    doc: &Document,
    opts: &ResolveOptions<'_>,
    ctx: &mut Context,
) -> Result<String> {
    match resolve(text, doc, opts, ctx)? {
        Resolved::Single(item) => Ok(item.text),
        Resolved::Expanded(mut items) if items.len() == 1 => Ok(items.remove(0).text),
        Resolved::Expanded(items) => Err(WclError::AmbiguousExpansion {
            text: text.to_string(),
            count: items.len(),
        }),
    }
}

fn resolve(
    input: &str,
    doc: &Document,
    opts: &ResolveOptions<'_>,
    ctx: &mut Context,
) -> Result<Resolved> {
    debug!("Resolving '{}'", input);

    let mut text = input.to_string();
    let mut keep = Bindings::new();

    let mut resolver = Substitution {
        input,
        doc,
        opts,
        ctx,
        keep: &mut keep,
    };
    resolver.until_stable(&mut text, &[Form::Header, Form::Optional, Form::Required])?;
    resolver.until_stable(&mut text, &[Form::Function])?;

    let item = Expansion {
        text,
        bindings: keep,
    };

    if !has_loops(&item.text) {
        trace!("Resolved '{}' -> '{}'", input, item.text);
        return Ok(Resolved::Single(item));
    }

    let items = expand_loops(item.clone(), doc, opts)?;
    if items.is_empty() {
        debug!("'{}' has a loop variable without values, leaving it unexpanded", input);
        return Ok(Resolved::Single(item));
    }

    debug!("Expanded '{}' into {} combinations", input, items.len());
    Ok(Resolved::Expanded(items))
}

/// State shared by the substitution passes of one `resolve` call.
struct Substitution<'r, 'o> {
    input: &'r str,
    doc: &'r Document,
    opts: &'r ResolveOptions<'o>,
    ctx: &'r mut Context,
    keep: &'r mut Bindings,
}

impl Substitution<'_, '_> {
    fn guard(&self) -> WclError {
        WclError::LoopGuardExceeded {
            text: self.input.to_string(),
        }
    }

    fn until_stable(&mut self, text: &mut String, forms: &[Form]) -> Result<()> {
        for _ in 0..MAX_SUBSTITUTION_PASSES {
            let mut changed = false;
            for form in forms {
                changed |= self.substitute(text, *form)?;
            }
            if !changed {
                return Ok(());
            }
        }
        Err(self.guard())
    }

    /// Substitutes every occurrence of one form, returning whether a value
    /// was found for at least one of them.
    fn substitute(&mut self, text: &mut String, form: Form) -> Result<bool> {
        let mut changed = false;
        let mut count = 0;

        loop {
            let found = form
                .pattern()
                .captures(text.as_str())
                .map(|caps| (caps[0].to_string(), caps[1].to_string()));
            let Some((token, var)) = found else {
                break;
            };

            count += 1;
            if count > MAX_SUBSTITUTION_PASSES {
                return Err(self.guard());
            }

            let replacement = match form {
                Form::Header => Some(self.header(&var)?),
                Form::Function => Some(self.function(&var)?),
                Form::Optional | Form::Required => self.variable(&var)?,
            };

            match replacement {
                Some(value) => {
                    trace!("{} -> '{}'", token, value);
                    *text = text.replace(&token, &value);
                    changed = true;
                }
                None if form == Form::Required => {
                    return Err(WclError::missing(split_format(&var).0));
                }
                None => {
                    trace!("{} missing, substituting empty string", token);
                    *text = text.replace(&token, "");
                }
            }
        }

        Ok(changed)
    }

    fn variable(&mut self, var: &str) -> Result<Option<String>> {
        let (name, width) = split_format(var);

        let search = self.opts.search.with_required(false);
        let Some(found) = self.doc.search(name, &search)? else {
            return Ok(None);
        };
        let value = found.as_str().ok_or_else(|| WclError::NotScalar {
            key: name.to_string(),
        })?;

        if is_multi_valued(value) {
            if self.opts.expand {
                return Ok(Some(format!("$LOOP{{{}}}", var)));
            }
            return Ok(Some(value.to_string()));
        }

        let Some(width) = width else {
            self.keep.insert(name.to_string(), value.to_string());
            return Ok(Some(value.to_string()));
        };

        self.ctx.enter(name, self.input)?;
        let resolved = resolve_single(value, self.doc, self.opts, self.ctx);
        self.ctx.leave();
        let resolved = resolved?;

        let padded = zero_pad(&resolved, width)?;
        self.keep.insert(name.to_string(), resolved);
        Ok(Some(padded))
    }

    fn header(&self, spec: &str) -> Result<String> {
        let mut parts = spec.split(',').map(str::trim);
        let file = parts.next().unwrap_or_default();
        let keys: Vec<&str> = parts.collect();

        let registry = self.opts.registry.ok_or_else(|| WclError::NoHeaderReader {
            spec: spec.to_string(),
        })?;
        Ok(registry.read_headers(file, &keys)?.join(","))
    }

    fn function(&self, spec: &str) -> Result<String> {
        let mut parts = spec.split(',').map(|p| p.trim().to_string());
        let name = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.collect();

        let registry = self
            .opts
            .registry
            .ok_or_else(|| WclError::UnknownFunction { name: name.clone() })?;
        registry.call_function(&name, &args)
    }
}

/// Splits `name:N` into the variable name and optional width.
pub(crate) fn split_format(var: &str) -> (&str, Option<&str>) {
    match var.split_once(':') {
        Some((name, width)) => (name, Some(width)),
        None => (var, None),
    }
}

/// Whether a value stands for several values (`a,b,c` or `(1:4)`).
pub fn is_multi_valued(value: &str) -> bool {
    value.starts_with('(') || value.contains(',')
}

/// Zero-pads an integer-valued string to `width` digits.
pub(crate) fn zero_pad(value: &str, width: &str) -> Result<String> {
    let format_error = || WclError::Format {
        pattern: format!("%0{}d", width),
        value: value.to_string(),
    };

    let width: usize = width.trim().parse().map_err(|_| format_error())?;
    let number: i64 = value.trim().parse().map_err(|_| format_error())?;
    Ok(format!("{:0width$}", number, width = width))
}
