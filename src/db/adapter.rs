//! # Database Adapter
//!
//! Minimal execution seam between the executor and a connection pool. Each
//! backend implements it once; the executor only sees documents.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use super::query::SelectQuery;
use crate::error::{QueryError, QueryResult};
use crate::sql::SqlDialect;

/// Boxed future returned by adapters
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = QueryResult<T>> + Send + 'a>>;

/// Executes document queries against one backend
pub trait DatabaseAdapter: Send + Sync {
    /// Dialect used to render queries for this backend
    fn dialect(&self) -> &'static dyn SqlDialect;

    /// Run `query` and return one document per row, in row order.
    ///
    /// Dropping the returned future releases the pooled connection and
    /// abandons the statement.
    fn fetch_documents<'a>(&'a self, query: &'a SelectQuery) -> AdapterFuture<'a, Vec<Value>>;

    /// Cheap liveness probe
    fn health_check(&self) -> AdapterFuture<'_, ()>;
}

/// Bound a database call by `limit`. Expiry is an execution error, and not
/// a transient one: repeating a slow statement rarely makes it fast.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> QueryResult<T>
where
    F: Future<Output = QueryResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::execution(format!(
            "statement exceeded {}ms",
            limit.as_millis()
        ))),
    }
}
