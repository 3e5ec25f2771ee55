//! # Query Errors
//!
//! Unified error type for clause generation, execution and projection.
//!
//! Denied fields are never an error: the projector omits them silently.

use serde::Serialize;
use thiserror::Error;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised by the query core
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    // ==================
    // Caller Errors
    // ==================
    /// Malformed or unsupported filter, operator, path or limit
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================
    // Server Errors
    // ==================
    /// Contract violation between retrieval and projection
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database-layer failure
    #[error("Execution error: {message}")]
    Execution {
        /// Driver message (logged, never returned to callers)
        message: String,
        /// Whether retrying the call may succeed
        transient: bool,
    },
}

impl QueryError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a non-transient execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            transient: false,
        }
    }

    /// Create a transient execution error (connection reset, pool exhausted)
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            transient: true,
        }
    }

    /// Whether the execution adapter may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Execution { transient: true, .. })
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Execution { .. } => "EXECUTION_ERROR",
        }
    }

    /// HTTP-style status for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Internal(_) => 500,
            Self::Execution {
                transient: true, ..
            } => 503,
            Self::Execution { .. } => 500,
        }
    }

    /// Message safe to show to callers.
    ///
    /// Validation messages only ever contain caller input. Internal and
    /// execution details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Execution { .. } => "The query could not be executed".to_string(),
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("document decode failed: {}", e))
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        let transient = match &e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => {
                // 08xxx: connection exceptions, 57P01: admin shutdown
                db.code()
                    .map(|c| c.starts_with("08") || c == "57P01")
                    .unwrap_or(false)
            }
            _ => false,
        };
        Self::Execution {
            message: e.to_string(),
            transient,
        }
    }
}

/// Error body handed to the transport layer
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&QueryError> for ErrorResponse {
    fn from(err: &QueryError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.public_message(),
        }
    }
}
