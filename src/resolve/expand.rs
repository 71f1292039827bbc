//! Loop Expansion
//!
//! Turns text containing `$LOOP{name}` placeholders into one concrete text
//! per combination of values. Work items live on a stack, so the last value
//! of a variable is expanded further before the earlier ones. Callers see
//! that order (it decides which generated command comes first), so it must
//! stay stack-based.

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use super::engine::{split_format, zero_pad, Expansion, ResolveOptions};
use crate::document::Document;
use crate::error::{Result, WclError};

/// Cap on work items popped during one loop expansion.
pub const MAX_LOOP_ITERATIONS: usize = 1000;

static LOOP_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$LOOP\{([^}]+)\}").expect("valid $LOOP pattern"));

static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(\d+)$").expect("valid range pattern"));

/// Whether `text` still contains a `$LOOP{}` placeholder.
pub fn has_loops(text: &str) -> bool {
    LOOP_VAR.is_match(text)
}

/// Splits a multi-valued string into its values.
///
/// Parentheses are dropped, items are trimmed, and an item of the form
/// `A:B` expands to every integer from A to B inclusive.
///
/// # Example
///
/// ```
/// use wclkit::resolve::split_values;
///
/// assert_eq!(split_values("g, r ,i", ','), vec!["g", "r", "i"]);
/// assert_eq!(split_values("(1:3,10)", ','), vec!["1", "2", "3", "10"]);
/// ```
pub fn split_values(text: &str, delim: char) -> Vec<String> {
    split_values_within(text, delim, usize::MAX).unwrap_or_default()
}

/// Like [`split_values`], but gives up with `None` once more than `limit`
/// values would be produced.
fn split_values_within(text: &str, delim: char, limit: usize) -> Option<Vec<String>> {
    let stripped: String = text.chars().filter(|c| *c != '(' && *c != ')').collect();

    let mut values = Vec::new();
    for item in stripped.split(delim).map(str::trim) {
        match parse_range(item) {
            Some((start, end)) => {
                let span = if end < start { 0 } else { (end - start).saturating_add(1) };
                if span > (limit - values.len()) as u64 {
                    return None;
                }
                values.extend((start..=end).map(|n| n.to_string()));
            }
            None => {
                if values.len() >= limit {
                    return None;
                }
                values.push(item.to_string());
            }
        }
    }
    Some(values)
}

fn parse_range(item: &str) -> Option<(u64, u64)> {
    let caps = RANGE.captures(item)?;
    let start = caps[1].parse().ok()?;
    let end = caps[2].parse().ok()?;
    Some((start, end))
}

/// Expands every `$LOOP{}` in `seed`, returning the finished combinations.
///
/// Each combination carries the seed's bindings plus the (unpadded) value
/// chosen for every loop variable along its branch. Popped items and
/// generated branches both count against [`MAX_LOOP_ITERATIONS`].
pub(crate) fn expand_loops(
    seed: Expansion,
    doc: &Document,
    opts: &ResolveOptions<'_>,
) -> Result<Vec<Expansion>> {
    let search = opts.search.with_required(true);
    let original = seed.text.clone();

    let mut todo = vec![seed];
    let mut done = Vec::new();
    let mut count = 0;

    while let Some(item) = todo.pop() {
        count += 1;
        if count > MAX_LOOP_ITERATIONS {
            return Err(WclError::LoopGuardExceeded { text: original });
        }

        let found = LOOP_VAR
            .captures(&item.text)
            .map(|caps| (caps[0].to_string(), caps[1].to_string()));
        let Some((token, var)) = found else {
            done.push(item);
            continue;
        };
        let (name, width) = split_format(&var);

        let value = doc
            .search(name, &search)?
            .ok_or_else(|| WclError::missing(name))?
            .as_str()
            .ok_or_else(|| WclError::NotScalar {
                key: name.to_string(),
            })?;

        let values = split_values_within(value, ',', MAX_LOOP_ITERATIONS - count)
            .ok_or_else(|| WclError::LoopGuardExceeded {
                text: original.clone(),
            })?;
        count += values.len();

        for raw in values {
            let concrete = match width {
                Some(width) => zero_pad(&raw, width)?,
                None => raw.clone(),
            };

            let mut bindings = item.bindings.clone();
            bindings.insert(name.to_string(), raw);

            let next = Expansion {
                text: item.text.replace(&token, &concrete),
                bindings,
            };
            trace!("loop {} -> '{}'", token, next.text);

            if has_loops(&next.text) {
                todo.push(next);
            } else {
                done.push(next);
            }
        }
    }

    Ok(done)
}
