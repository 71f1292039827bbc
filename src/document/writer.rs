//! WCL Serializer
//!
//! Renders a [`Document`] back to WCL markup. Sections become indented
//! `<key>` ... `</key>` blocks and scalars become `key = value` lines.
//! Empty scalars are skipped.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;

use super::model::{Document, Value};
use crate::error::{Result, WclError};

/// Section whose entry order is always written as-is.
const ORDERED_SECTION: &str = "cmdline";

/// Writes `doc` as WCL text.
///
/// With `sorted`, sibling keys are written alphabetically at every level
/// except inside `cmdline`, whose order encodes argument positions.
///
/// # Arguments
///
/// * `doc` - Document to write
/// * `out` - Destination
/// * `sorted` - Alphabetize sibling keys
/// * `indent` - Spaces added per nesting level
pub fn write_wcl<W: Write>(doc: &Document, out: &mut W, sorted: bool, indent: usize) -> io::Result<()> {
    write_section(doc, out, sorted, indent, 0)
}

fn write_section<W: Write>(
    doc: &Document,
    out: &mut W,
    sorted: bool,
    indent: usize,
    depth: usize,
) -> io::Result<()> {
    let mut entries: Vec<(&str, &Value)> = doc.iter().collect();
    if sorted {
        entries.sort_by(|a, b| a.0.cmp(b.0));
    }

    let pad = " ".repeat(depth);
    for (key, value) in entries {
        match value {
            Value::Section(section) => {
                writeln!(out, "{}<{}>", pad, key)?;
                let sorted_inside = sorted && key != ORDERED_SECTION;
                write_section(section, out, sorted_inside, indent, depth + indent)?;
                writeln!(out, "{}</{}>", pad, key)?;
            }
            Value::Scalar(text) if text.is_empty() => {}
            Value::Scalar(text) => writeln!(out, "{}{} = {}", pad, key, text)?,
        }
    }
    Ok(())
}

/// Renders `doc` as a WCL string.
///
/// # Example
///
/// ```
/// use wclkit::document::{parse_str, to_wcl_string};
///
/// let doc = parse_str("<a>\nb = 1\n</a>\n").unwrap();
/// assert_eq!(to_wcl_string(&doc, false, 4), "<a>\n    b = 1\n</a>\n");
/// ```
pub fn to_wcl_string(doc: &Document, sorted: bool, indent: usize) -> String {
    let mut buffer = Vec::new();
    let _ = write_wcl(doc, &mut buffer, sorted, indent);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Saves `doc` as a WCL file.
pub fn save_wcl(doc: &Document, path: impl AsRef<Path>, sorted: bool, indent: usize) -> Result<()> {
    let path = path.as_ref();
    let io_error = |source| WclError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_error)?;
    let mut out = BufWriter::new(file);
    write_wcl(doc, &mut out, sorted, indent).map_err(io_error)?;
    out.flush().map_err(io_error)?;

    info!("WCL saved to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{load_wcl, parse_str};
    use tempfile::tempdir;

    #[test]
    fn test_write_nested_indent() {
        let doc = parse_str("top = 1\n<a>\n<b>\nc = 2\n</b>\n</a>\n").unwrap();
        assert_eq!(
            to_wcl_string(&doc, false, 2),
            "top = 1\n<a>\n  <b>\n    c = 2\n  </b>\n</a>\n"
        );
    }

    #[test]
    fn test_write_keeps_insertion_order() {
        let doc = Document::from_pairs(vec![("z", Value::from("1")), ("a", Value::from("2"))]);
        assert_eq!(to_wcl_string(&doc, false, 4), "z = 1\na = 2\n");
    }

    #[test]
    fn test_write_sorted() {
        let doc = Document::from_pairs(vec![("z", Value::from("1")), ("a", Value::from("2"))]);
        assert_eq!(to_wcl_string(&doc, true, 4), "a = 2\nz = 1\n");
    }

    #[test]
    fn test_sorted_leaves_cmdline_order() {
        let text = "<exec_1>\nexecname = prog\n<cmdline>\nzeta = 1\n_01 = in.fits\nalpha = _flag\n</cmdline>\n</exec_1>\n";
        let doc = parse_str(text).unwrap();

        let expected = "<exec_1>\n    <cmdline>\n        zeta = 1\n        _01 = in.fits\n        alpha = _flag\n    </cmdline>\n    execname = prog\n</exec_1>\n";
        assert_eq!(to_wcl_string(&doc, true, 4), expected);
    }

    #[test]
    fn test_empty_scalar_omitted() {
        let doc = Document::from_pairs(vec![("a", Value::from("")), ("b", Value::from("x"))]);
        assert_eq!(to_wcl_string(&doc, false, 4), "b = x\n");
    }

    #[test]
    fn test_empty_section_written() {
        let doc = Document::from_pairs(vec![("a", Value::from(Document::new()))]);
        assert_eq!(to_wcl_string(&doc, false, 4), "<a>\n</a>\n");
    }

    #[test]
    fn test_round_trip() {
        let text = "<exec_1>\n<cmdline>\nOutFile = ${out}\n_01 = x\n</cmdline>\nexecname = prog\n</exec_1>\n<module detrend>\nbands = g,r\n</module>\nout = a.fits\n";
        let doc = parse_str(text).unwrap();
        let reparsed = parse_str(&to_wcl_string(&doc, false, 4)).unwrap();
        assert_eq!(reparsed, doc);

        let reparsed_sorted = parse_str(&to_wcl_string(&doc, true, 3)).unwrap();
        assert_eq!(reparsed_sorted.len(), doc.len());
        assert_eq!(
            reparsed_sorted.section("module").unwrap().section("detrend"),
            doc.section("module").unwrap().section("detrend")
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out.wcl");

        let doc = parse_str("<a>\nb = 1\n</a>\n").unwrap();
        save_wcl(&doc, &path, false, 4).unwrap();
        assert!(path.exists());

        let loaded = load_wcl(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_save_to_missing_directory() {
        let doc = Document::new();
        let result = save_wcl(&doc, "/nonexistent/dir/out.wcl", false, 4);
        assert!(matches!(result, Err(WclError::Io { .. })));
    }
}
