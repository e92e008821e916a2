//! CLI module for ctxmgmt
//!
//! Provides command-line interface for:
//! - types: List registered types
//! - apply: Apply a config file and show the config log
//! - resolve: Resolve credentials of a consumer

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{apply, resolve, run, run_command, types};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
