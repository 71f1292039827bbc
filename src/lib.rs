//! wclkit - WCL Configuration Engine
//!
//! Parses, queries, resolves and writes WCL, the nested markup used to
//! describe batch-processing pipelines: which executables to run, their
//! inputs and outputs, and the values derived from other values.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`document`]: Document model, scoped lookup, parsing and serialization
//! - [`resolve`]: `${...}` variable resolution and loop expansion
//! - [`execution`]: Command-line construction from `exec_N` sections
//! - [`error`]: Crate error type
//!
//! # Example
//!
//! ```rust,no_run
//! use wclkit::load_wcl;
//! use wclkit::resolve::{replace_vars, ResolveOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a pipeline description
//!     let doc = load_wcl("wrapper_input.wcl")?;
//!
//!     // Resolve a template, one result per loop combination
//!     let opts = ResolveOptions::new().with_expand(true);
//!     for item in replace_vars("D${expnum}_${band}.fits", &doc, &opts)?.into_expansions() {
//!         println!("{}", item.text);
//!     }
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod execution;
pub mod resolve;

// Re-export commonly used types
pub use document::{load_wcl, parse_str, save_wcl, Document, Parser, SearchOptions, Value};
pub use error::{Result, WclError};
pub use resolve::{replace_vars, replace_vars_single, Registry, ResolveOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "wclkit";
