//! Query Executor subsystem for aeroquery
//!
//! Wires clause generation, the result cache, the execution adapter and
//! document projection into one request lifecycle.
//!
//! # Execution Flow (strict order)
//!
//! 1. Build the WHERE clause from the request filter
//! 2. Check the result cache
//! 3. Execute against the database (transient failures retried)
//! 4. Project every row through the selection and authorization mask
//! 5. Populate the cache
//!
//! # Invariants
//!
//! - Transitions only move forward (see [`RequestState`])
//! - Only fully projected responses are cached
//! - Validation and internal errors are never retried

mod executor;
mod operation;
mod request;
mod state;

pub use executor::{explain, QueryExecutor};
pub use operation::{CompiledSchema, OperationDef, OperationRegistry, ResolvedOperation};
pub use request::QueryRequest;
pub use state::{ExecutionTrace, RequestState};
