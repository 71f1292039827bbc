//! WCL Document Module
//!
//! The nested, ordered configuration tree and everything that moves it in
//! and out of text.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Document, Value)
//! - [`search`]: Scoped key lookup and variable scanning
//! - [`parser`]: WCL markup parsing, includes and `inclfunc`
//! - [`writer`]: WCL serialization

pub mod model;
pub mod parser;
pub mod search;
pub mod writer;

pub use model::{Document, Value, CURRENT_KEY};
pub use parser::{expand_path, load_wcl, parse, parse_str, Parser, MAX_INCLUDE_DEPTH};
pub use search::SearchOptions;
pub use writer::{save_wcl, to_wcl_string, write_wcl};
