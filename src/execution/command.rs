//! Command Line Construction
//!
//! Builds the command line for an `exec_N` section:
//! - `execname` becomes the program
//! - each `cmdline` entry becomes an option, in insertion order
//! - `_N` entries are positional and land at index N afterwards, counting
//!   the program and each option with its value as one position
//!
//! Running the command is left to the caller.

use std::fmt;
use std::str::FromStr;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{Document, Value};
use crate::error::{Result, WclError};
use crate::resolve::{replace_vars_single, ResolveOptions};

/// Value marking a `cmdline` option that takes no argument.
pub const FLAG_VALUE: &str = "_flag";

static EXEC_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^exec_\d+$").expect("valid exec section pattern"));

static POSITIONAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_(\d+)$").expect("valid positional pattern"));

/// How option names are prefixed, selected by `cmd_hyphen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HyphenStyle {
    /// `-name` for every option
    #[default]
    AllSingle,
    /// `--name` for every option
    AllDouble,
    /// `-x` for one-letter options, `--name` otherwise
    MixedGnu,
}

impl HyphenStyle {
    pub fn hyphen_for(&self, option: &str) -> &'static str {
        match self {
            HyphenStyle::AllSingle => "-",
            HyphenStyle::AllDouble => "--",
            HyphenStyle::MixedGnu if option.chars().count() == 1 => "-",
            HyphenStyle::MixedGnu => "--",
        }
    }
}

impl FromStr for HyphenStyle {
    type Err = WclError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allsingle" => Ok(HyphenStyle::AllSingle),
            "alldouble" => Ok(HyphenStyle::AllDouble),
            "mixed_gnu" => Ok(HyphenStyle::MixedGnu),
            other => Err(WclError::Format {
                pattern: "allsingle|alldouble|mixed_gnu".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A constructed command line: the program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Section the command was built from
    pub exec: String,
    words: Vec<String>,
}

impl CommandLine {
    pub fn program(&self) -> &str {
        &self.words[0]
    }

    pub fn args(&self) -> &[String] {
        &self.words[1..]
    }

    /// Program and arguments as one list.
    pub fn words(&self) -> &[String] {
        &self.words
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}

/// Lists the top-level `exec_<digits>` sections in document order.
pub fn exec_sections(doc: &Document) -> Vec<(&str, &Document)> {
    doc.iter()
        .filter(|(key, _)| EXEC_SECTION.is_match(key))
        .filter_map(|(key, value)| value.as_section().map(|section| (key, section)))
        .collect()
}

/// Builds the command line for the `exec_key` section of `doc`.
///
/// Every value is fully resolved against `doc` with `opts`.
///
/// # Arguments
///
/// * `doc` - Document holding the exec section and the variables it uses
/// * `exec_key` - Section name, such as `exec_1`
/// * `opts` - Resolution options (search scope, function registry)
///
/// # Example
///
/// ```
/// use wclkit::document::parse_str;
/// use wclkit::execution::build_command_line;
/// use wclkit::resolve::ResolveOptions;
///
/// let doc = parse_str(
///     "out = x.fits\n<exec_1>\nexecname = prog\n<cmdline>\nout = ${out}\n_01 = in.fits\n</cmdline>\n</exec_1>\n",
/// ).unwrap();
/// let cmd = build_command_line(&doc, "exec_1", &ResolveOptions::new()).unwrap();
/// assert_eq!(cmd.to_string(), "prog in.fits -out x.fits");
/// ```
pub fn build_command_line(
    doc: &Document,
    exec_key: &str,
    opts: &ResolveOptions<'_>,
) -> Result<CommandLine> {
    let exec = doc
        .section(exec_key)
        .ok_or_else(|| WclError::missing(exec_key))?;

    let execname = exec
        .get_local("execname")
        .and_then(Value::as_str)
        .ok_or_else(|| WclError::missing(format!("{}.execname", exec_key)))?;
    // one unit per program, option (with its value) or positional
    let mut units: Vec<Vec<String>> = vec![vec![replace_vars_single(execname, doc, opts)?]];

    if let Some(cmdline) = exec.section("cmdline") {
        let style = match exec.get_local("cmd_hyphen").and_then(Value::as_str) {
            Some(name) => name.parse::<HyphenStyle>()?,
            None => HyphenStyle::default(),
        };

        let mut positional: Vec<(usize, String)> = Vec::new();
        for (key, value) in cmdline.iter() {
            let raw = value.as_str().ok_or_else(|| WclError::NotScalar {
                key: format!("{}.cmdline.{}", exec_key, key),
            })?;
            let expanded = replace_vars_single(raw, doc, opts)?;

            if key.starts_with('_') {
                let index = POSITIONAL
                    .captures(key)
                    .and_then(|caps| caps[1].parse::<usize>().ok())
                    .ok_or_else(|| WclError::Format {
                        pattern: "_<position>".to_string(),
                        value: key.to_string(),
                    })?;
                positional.push((index, expanded));
                continue;
            }

            let mut unit = vec![format!("{}{}", style.hyphen_for(key), key)];
            if expanded != FLAG_VALUE {
                unit.push(expanded);
            }
            units.push(unit);
        }

        positional.sort_by_key(|(index, _)| *index);
        for (index, value) in positional {
            let at = index.min(units.len());
            units.insert(at, vec![value]);
        }
    }

    let words: Vec<String> = units.into_iter().flatten().collect();
    debug!("{} command line: {}", exec_key, words.join(" "));
    Ok(CommandLine {
        exec: exec_key.to_string(),
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_str;

    fn build(text: &str) -> Result<CommandLine> {
        let doc = parse_str(text)?;
        build_command_line(&doc, "exec_1", &ResolveOptions::new())
    }

    #[test]
    fn test_exec_sections_in_order() {
        let doc = parse_str(
            "<exec_2>\nexecname = b\n</exec_2>\n<exec_x>\n</exec_x>\n<exec_1>\nexecname = a\n</exec_1>\nexec_3 = scalar\n",
        )
        .unwrap();
        let names: Vec<&str> = exec_sections(&doc).into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["exec_2", "exec_1"]);
    }

    #[test]
    fn test_program_only() {
        let cmd = build("<exec_1>\nexecname = prog\n</exec_1>\n").unwrap();
        assert_eq!(cmd.program(), "prog");
        assert!(cmd.args().is_empty());
        assert_eq!(cmd.exec, "exec_1");
    }

    #[test]
    fn test_options_and_flags() {
        let cmd = build(
            "<exec_1>\nexecname = prog\n<cmdline>\nverbose = _flag\nlevel = 3\n</cmdline>\n</exec_1>\n",
        )
        .unwrap();
        assert_eq!(cmd.to_string(), "prog -verbose -level 3");
    }

    #[test]
    fn test_positional_arguments_inserted_by_index() {
        let cmd = build(
            "<exec_1>\nexecname = prog\n<cmdline>\n_02 = out.fits\nq = _flag\n_01 = in.fits\n</cmdline>\n</exec_1>\n",
        )
        .unwrap();
        assert_eq!(cmd.args(), &["in.fits", "out.fits", "-q"]);
    }

    #[test]
    fn test_positional_never_splits_option_from_value() {
        let cmd = build(
            "<exec_1>\nexecname = prog\n<cmdline>\na = 1\nb = 2\n_2 = pos\n</cmdline>\n</exec_1>\n",
        )
        .unwrap();
        assert_eq!(cmd.to_string(), "prog -a 1 pos -b 2");
        assert_eq!(cmd.args(), &["-a", "1", "pos", "-b", "2"]);
    }

    #[test]
    fn test_positional_past_end_appends() {
        let cmd = build("<exec_1>\nexecname = prog\n<cmdline>\n_10 = last\n</cmdline>\n</exec_1>\n").unwrap();
        assert_eq!(cmd.to_string(), "prog last");
    }

    #[test]
    fn test_bad_positional_name() {
        let err = build("<exec_1>\nexecname = prog\n<cmdline>\n_first = x\n</cmdline>\n</exec_1>\n")
            .unwrap_err();
        assert!(matches!(err, WclError::Format { ref value, .. } if value == "_first"));
    }

    #[test]
    fn test_hyphen_styles() {
        let text = |style: &str| {
            format!(
                "<exec_1>\nexecname = prog\ncmd_hyphen = {}\n<cmdline>\nv = _flag\nconfig = a.cfg\n</cmdline>\n</exec_1>\n",
                style
            )
        };
        assert_eq!(build(&text("allsingle")).unwrap().to_string(), "prog -v -config a.cfg");
        assert_eq!(build(&text("alldouble")).unwrap().to_string(), "prog --v --config a.cfg");
        assert_eq!(build(&text("mixed_gnu")).unwrap().to_string(), "prog -v --config a.cfg");
        assert!(matches!(build(&text("weird")), Err(WclError::Format { .. })));
    }

    #[test]
    fn test_values_are_resolved() {
        let cmd = build(
            "ccd = 7\nexpnum = 229034\n<exec_1>\nexecname = ${tool}\n<cmdline>\nOutFile = D${expnum}_c${ccd:2}.fits\n</cmdline>\n</exec_1>\ntool = immask\n",
        )
        .unwrap();
        assert_eq!(cmd.to_string(), "immask -OutFile D229034_c07.fits");
    }

    #[test]
    fn test_missing_execname() {
        let err = build("<exec_1>\n<cmdline>\na = 1\n</cmdline>\n</exec_1>\n").unwrap_err();
        assert!(matches!(err, WclError::MissingKey { ref key } if key == "exec_1.execname"));
    }

    #[test]
    fn test_missing_exec_section() {
        let err = build("x = 1\n").unwrap_err();
        assert!(matches!(err, WclError::MissingKey { ref key } if key == "exec_1"));
    }

    #[test]
    fn test_multi_valued_option_is_ambiguous() {
        let doc = parse_str("bands = g,r\n<exec_1>\nexecname = p\n<cmdline>\nb = ${bands}\n</cmdline>\n</exec_1>\n")
            .unwrap();
        let opts = ResolveOptions::new().with_expand(true);
        let err = build_command_line(&doc, "exec_1", &opts).unwrap_err();
        assert!(matches!(err, WclError::AmbiguousExpansion { count: 2, .. }));
    }
}
