//! CLI module for searchstore
//!
//! Provides command-line interface for:
//! - search: Feed JSON rows through a search's tables and print the response
//! - explain: Print the compiled plan of each table

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, run, run_command, search, SearchOptions};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_rows, write_error, write_response};
