//! CLI argument definitions using clap
//!
//! Commands:
//! - searchstore search --settings <path> --input <path> [--config <path>]
//! - searchstore explain --settings <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// searchstore - grouped, sorted, bounded search result tables
#[derive(Parser, Debug)]
#[command(name = "searchstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed rows through a search's tables and print the response
    Search {
        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to search settings (query key and component tables)
        #[arg(long)]
        settings: PathBuf,

        /// JSON lines file, one array of values per row; "-" reads stdin
        #[arg(long, default_value = "-")]
        input: PathBuf,

        /// First row position to return
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum rows to return per component
        #[arg(long)]
        length: Option<usize>,

        /// Encoded group key to expand; repeatable
        #[arg(long = "open-group")]
        open_groups: Vec<String>,
    },

    /// Print the compiled depths and sorts of each component
    Explain {
        /// Path to search settings
        #[arg(long)]
        settings: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
