//! Tooling Layer
//!
//! Command-line access to a branch store.

pub mod cli;

pub use cli::{ChildCommands, Cli, CliContext, Commands};
