//! Execution Support Module
//!
//! Turns `exec_N` sections of a resolved document into the command lines
//! a wrapper would run. Launching processes is up to the caller.
//!
//! # Architecture
//!
//! - [`command`]: exec section discovery and command-line construction

pub mod command;

pub use command::{build_command_line, exec_sections, CommandLine, HyphenStyle, FLAG_VALUE};
