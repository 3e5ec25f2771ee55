//! CLI command implementations
//!
//! Both commands are one-shot: load config and compiled schema, handle one
//! request, print one JSON line, exit. A failed request prints its
//! `ErrorResponse` and still exits non-zero.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::config::QueryConfig;
use crate::db;
use crate::error::ErrorResponse;
use crate::executor::{self, CompiledSchema, OperationRegistry, QueryExecutor};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Query { config, request } => query(&config, request.as_deref()),
        Command::Explain { config, request } => explain(&config, request.as_deref()),
    }
}

/// Load config and the operation registry it points at.
///
/// A relative schema path is resolved against the config file's directory.
fn load(config_path: &Path) -> CliResult<(QueryConfig, Arc<OperationRegistry>)> {
    let config = QueryConfig::from_file(config_path)?;

    let schema = match &config.schema {
        Some(path) => {
            let path = if path.is_relative() {
                config_path
                    .parent()
                    .map(|dir| dir.join(path))
                    .unwrap_or_else(|| path.clone())
            } else {
                path.clone()
            };
            CompiledSchema::from_file(&path)?
        }
        None => return Err(CliError::config_error("config has no schema path")),
    };

    let registry = OperationRegistry::from_schema(schema)
        .map_err(|e| CliError::config_error(e.to_string()))?;
    info!(operations = registry.operations().len(), "schema loaded");

    Ok((config, Arc::new(registry)))
}

/// Execute one request against the configured database
pub fn query(config_path: &Path, request_path: Option<&Path>) -> CliResult<()> {
    let (config, registry) = load(config_path)?;
    let input = read_request(request_path)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::connect_failed(format!("Failed to create tokio runtime: {}", e)))?;

    let result = rt.block_on(async {
        let adapter = db::connect(&config.database)
            .await
            .map_err(|e| CliError::connect_failed(e.to_string()))?;
        let executor = QueryExecutor::from_config(&config, adapter, registry);
        Ok::<_, CliError>(executor.execute(&input.request, &input.identity).await)
    })?;

    match result {
        Ok(response) => write_response(response),
        Err(err) => {
            write_error(&ErrorResponse::from(&err))?;
            Err(CliError::query_failed(err.code()))
        }
    }
}

/// Print the SQL and parameter count for one request, without connecting
pub fn explain(config_path: &Path, request_path: Option<&Path>) -> CliResult<()> {
    let (config, registry) = load(config_path)?;
    let input = read_request(request_path)?;

    match executor::explain(
        &registry,
        config.query,
        config.database.dialect.dialect(),
        &input.request,
    ) {
        Ok(rendered) => write_response(json!({
            "dialect": config.database.dialect,
            "sql": rendered.sql,
            "param_count": rendered.params.len(),
        })),
        Err(err) => {
            write_error(&ErrorResponse::from(&err))?;
            Err(CliError::query_failed(err.code()))
        }
    }
}
