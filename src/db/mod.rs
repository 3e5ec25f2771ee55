//! # Execution Adapters
//!
//! Rendering of document queries and their execution against a pool.

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{QueryError, QueryResult};
use crate::sql::DialectKind;

pub mod adapter;
pub mod postgres;
pub mod query;
pub mod retry;
pub mod sqlite;

pub use adapter::{AdapterFuture, DatabaseAdapter};
pub use postgres::PostgresAdapter;
pub use query::{OrderBy, RenderedQuery, SelectQuery};
pub use retry::RetryPolicy;
pub use sqlite::SqliteAdapter;

/// Open the adapter for the configured backend.
///
/// Queries can be rendered for every dialect, but execution is only wired
/// up for PostgreSQL and SQLite.
pub async fn connect(config: &DatabaseConfig) -> QueryResult<Arc<dyn DatabaseAdapter>> {
    let adapter: Arc<dyn DatabaseAdapter> = match config.dialect {
        DialectKind::Postgres => Arc::new(PostgresAdapter::connect(config).await?),
        DialectKind::Sqlite => Arc::new(SqliteAdapter::connect(config).await?),
        other => {
            return Err(QueryError::validation(format!(
                "no execution adapter for dialect '{}'",
                other
            )))
        }
    };
    Ok(adapter)
}
