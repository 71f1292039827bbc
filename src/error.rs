//! Error types for WCL parsing, lookup and resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by registered extension functions.
pub type ExtensionError = Box<dyn std::error::Error + Send + Sync>;

/// The error type for every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum WclError {
    /// Malformed markup: unbalanced sections, same-name nesting or a bad directive.
    #[error("File {file} Line {line} - Error: {message}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    /// A required variable or scoped lookup found nothing.
    #[error("Could not find value for {key}")]
    MissingKey { key: String },

    /// An intermediate segment of a dotted path does not exist.
    #[error("Key path segment '{key}' does not exist")]
    KeyNotFound { key: String },

    /// A `:N` zero-pad was applied to something that is not an integer.
    #[error("Cannot format '{value}' with pattern '{pattern}'")]
    Format { pattern: String, value: String },

    /// A bounded resolution loop ran out of iterations.
    #[error("Variable resolution aborting from infinite loop '{text}'")]
    LoopGuardExceeded { text: String },

    /// A single value was requested but expansion produced several.
    #[error("Expected a single value for '{text}' but expansion produced {count}")]
    AmbiguousExpansion { text: String, count: usize },

    /// A scalar was expected but the key names a section.
    #[error("'{key}' is a section, not a scalar value")]
    NotScalar { key: String },

    /// `$FUNC{}` or `<<inclfunc>>` named a function nobody registered.
    #[error("No function registered under '{name}'")]
    UnknownFunction { name: String },

    /// `$HEAD{}` was used but no header reader is installed.
    #[error("No header reader available to resolve $HEAD{{{spec}}}")]
    NoHeaderReader { spec: String },

    /// A registered collaborator failed.
    #[error("Extension '{name}' failed: {source}")]
    Extension {
        name: String,
        #[source]
        source: ExtensionError,
    },

    /// Reading or writing a WCL file failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WclError {
    pub(crate) fn syntax(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn missing(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }
}

/// Convenience `Result` alias using [`WclError`].
pub type Result<T> = std::result::Result<T, WclError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_message_includes_location() {
        let err = WclError::syntax("pipeline.wcl", 12, "found child section with same name (a)");
        assert_eq!(
            err.to_string(),
            "File pipeline.wcl Line 12 - Error: found child section with same name (a)"
        );
    }

    #[test]
    fn test_extension_error_keeps_source() {
        let err = WclError::Extension {
            name: "meta.lookup".to_string(),
            source: "database unavailable".into(),
        };
        assert!(err.to_string().contains("meta.lookup"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
