//! Command-line interface

mod args;
pub mod commands;

pub use args::{Cli, Commands, RestoreArgs, ValidateStackArgs};
