//! CLI argument definitions using clap
//!
//! Commands:
//! - ctxmgmt types
//! - ctxmgmt apply --config <path>
//! - ctxmgmt resolve --config <path> --consumer <k=v,...> [--show-values]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ctxmgmt - typed configuration and consumer credentials
#[derive(Parser, Debug)]
#[command(name = "ctxmgmt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Default log level of the library realm (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List known config types, repository types and consumer types
    Types,

    /// Apply a config file to a new context and report the config log
    Apply {
        /// Path to a JSON config object
        #[arg(long)]
        config: PathBuf,
    },

    /// Resolve the credentials of a consumer after applying a config file
    Resolve {
        /// Path to a JSON config object
        #[arg(long)]
        config: PathBuf,

        /// Consumer identity as comma separated name=value pairs
        #[arg(long)]
        consumer: String,

        /// Print property values instead of redacting them
        #[arg(long)]
        show_values: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
