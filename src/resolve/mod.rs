//! Variable Resolution Module
//!
//! Expands `${...}`-style references in WCL text, including multi-valued
//! loop expansion and zero-padded numeric formatting.
//!
//! # Structure
//!
//! - [`engine`]: substitution passes and the public `replace_vars` entry points
//! - [`expand`]: `$LOOP{}` expansion and multi-value splitting
//! - [`registry`]: registered `$FUNC`, `inclfunc` and `$HEAD` collaborators

pub mod engine;
pub mod expand;
pub mod registry;

pub use engine::{
    is_multi_valued, replace_vars, replace_vars_single, Bindings, Expansion, ResolveOptions,
    Resolved, MAX_SUBSTITUTION_PASSES,
};
pub use expand::{has_loops, split_values, MAX_LOOP_ITERATIONS};
pub use registry::{HeaderReader, IncludeFunction, Registry, StringFunction};
