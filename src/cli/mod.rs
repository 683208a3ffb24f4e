//! CLI module for detlink - command-line interface and subcommands.

pub mod commands;
pub mod console;

pub use commands::Cli;
