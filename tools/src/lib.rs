//! Shared code for the `opi` command-line tool.
pub mod args;
pub mod logging;
pub mod resolve;
