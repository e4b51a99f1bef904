//! Tooling
//!
//! Command-line access to one treedb: argument parsing, execution and output rendering.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, CliOutput, Commands};
