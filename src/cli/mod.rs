//! CLI module for aeroquery
//!
//! Provides command-line interface for:
//! - query: One-shot request execution
//! - explain: One-shot SQL rendering, no connection

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, query, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_request, read_request, write_error, write_response, CliRequest};
