//! ctxmgmt CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and exits with non-zero
//! on failure. All logic is delegated to the CLI module.

use ctxmgmt::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
