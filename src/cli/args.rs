//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroquery query --config <path> [--request <path>]
//! - aeroquery explain --config <path> [--request <path>]
//!
//! Without `--request` the request is read from stdin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aeroquery - filtered, projected, cached document queries
#[derive(Parser, Debug)]
#[command(name = "aeroquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a single request and print the response
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroquery.json")]
        config: PathBuf,

        /// Path to the request JSON (default: stdin)
        #[arg(long)]
        request: Option<PathBuf>,
    },

    /// Print the SQL a request would run, without running it
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./aeroquery.json")]
        config: PathBuf,

        /// Path to the request JSON (default: stdin)
        #[arg(long)]
        request: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
