//! Command-line interface for nonnative.

mod commands;

pub use commands::{is_verbose, run};
