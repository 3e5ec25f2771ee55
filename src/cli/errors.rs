//! Failures of the `aeroquery` binary itself.
//!
//! A failed query is reported twice: its `ErrorResponse` goes to stdout for
//! the caller, and a `QueryFailed` error decides the exit status.

use std::fmt;
use std::io;

use crate::config::ConfigError;

/// Why the binary stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Config or compiled schema unreadable or invalid
    ConfigError,
    /// Request input or response output failed
    IoError,
    /// No pool could be opened for the configured database
    ConnectFailed,
    /// The request failed after its error response was printed
    QueryFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "AEROQUERY_CLI_CONFIG_ERROR",
            Self::IoError => "AEROQUERY_CLI_IO_ERROR",
            Self::ConnectFailed => "AEROQUERY_CLI_CONNECT_FAILED",
            Self::QueryFailed => "AEROQUERY_CLI_QUERY_FAILED",
        }
    }

    /// Process exit status; 1 is kept for failed queries so scripts can
    /// tell a bad request from a broken setup.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::QueryFailed => 1,
            Self::ConfigError => 2,
            Self::IoError => 3,
            Self::ConnectFailed => 4,
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn connect_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConnectFailed, msg)
    }

    /// `query_code` is the machine code of the underlying query error
    pub fn query_failed(query_code: &str) -> Self {
        Self::new(CliErrorCode::QueryFailed, format!("request failed with {}", query_code))
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

// Malformed request JSON is an input problem, not a query failure
impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("malformed request: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;
