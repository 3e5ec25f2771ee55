//! aeroquery CLI entry point
//!
//! Initialises logging from `RUST_LOG` (JSON lines when
//! `AEROQUERY_LOG_FORMAT=json`), delegates to `cli::run`, prints errors to
//! stderr and exits with the error's status code.

use aeroquery::cli;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aeroquery=warn"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    match std::env::var("AEROQUERY_LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

fn main() {
    init_logging();

    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
