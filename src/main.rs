//! searchstore CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`; errors go to stderr
//! and end the process with a non-zero exit code.

use searchstore::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
