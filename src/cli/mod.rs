//! CLI layer for assistflow.
//!
//! Provides the command-line interface using clap, with commands for
//! chatting through a workflow and inspecting agents and workflows.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{ChatArgs, Cli, Commands};
