//! aeroquery - the query-execution core of a document-backed data API
//!
//! Compiles typed filter expressions into parameterized SQL for several
//! backends, retrieves one JSON document per row, projects each document
//! down to the caller's selection and field permissions, and memoizes
//! projected responses in a sharded LRU cache.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod filter;
pub mod projection;
pub mod selection;
pub mod sql;

pub use error::{ErrorResponse, QueryError, QueryResult};
