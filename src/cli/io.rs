//! JSON I/O handling for CLI
//!
//! - Input: one request object, from a file or stdin
//! - Output: one JSON object per line on stdout
//! - UTF-8 only

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use super::errors::{CliError, CliResult};
use crate::auth::CallerIdentity;
use crate::error::ErrorResponse;
use crate::executor::QueryRequest;

/// Request document accepted by the CLI
#[derive(Debug, Clone, Deserialize)]
pub struct CliRequest {
    #[serde(flatten)]
    pub request: QueryRequest,

    /// Resolved caller; anonymous when omitted
    #[serde(default)]
    pub identity: CallerIdentity,
}

/// Parse a request document
pub fn parse_request(input: &str) -> CliResult<CliRequest> {
    if input.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }
    Ok(serde_json::from_str(input)?)
}

/// Read the request from `path`, or stdin when absent
pub fn read_request(path: Option<&Path>) -> CliResult<CliRequest> {
    let input = match path {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?,
        None => {
            let mut input = String::new();
            io::stdin().lock().read_to_string(&mut input)?;
            input
        }
    };
    parse_request(&input)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_value(&json!({
        "status": "ok",
        "data": data
    }))
}

/// Write an error response to stdout
pub fn write_error(error: &ErrorResponse) -> CliResult<()> {
    write_value(&json!({
        "status": "error",
        "code": error.code,
        "message": error.message
    }))
}

fn write_value(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}
