//! PostgreSQL adapter over a sqlx pool.
//!
//! Every parameter is sent as text; generated clauses cast explicitly
//! wherever a typed comparison is needed, so the server never has to infer
//! a parameter type from context.

use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::trace;

use super::adapter::{with_timeout, AdapterFuture, DatabaseAdapter};
use super::query::SelectQuery;
use crate::config::DatabaseConfig;
use crate::error::{QueryError, QueryResult};
use crate::sql::{DialectKind, SqlDialect};

pub struct PostgresAdapter {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresAdapter {
    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> QueryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;
        Ok(Self::from_pool(pool, config.statement_timeout()))
    }

    pub fn from_pool(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Text form of a parameter; JSON null binds SQL NULL
pub(crate) fn param_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl PostgresAdapter {
    async fn fetch(&self, query: &SelectQuery) -> QueryResult<Vec<Value>> {
        let rendered = query.to_sql(self.dialect())?;
        trace!(sql = %rendered.sql, params = rendered.params.len(), "executing document query");

        let mut statement = sqlx::query(&rendered.sql);
        for param in &rendered.params {
            statement = statement.bind(param_as_text(param));
        }

        let rows = with_timeout(self.statement_timeout, async {
            statement.fetch_all(&self.pool).await.map_err(QueryError::from)
        })
        .await?;

        rows.iter()
            .map(|row| -> QueryResult<Value> {
                let Json(document) = row.try_get::<Json<Value>, _>(0)?;
                Ok(document)
            })
            .collect()
    }

    async fn ping(&self) -> QueryResult<()> {
        with_timeout(self.statement_timeout, async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(QueryError::from)
        })
        .await
    }
}

impl DatabaseAdapter for PostgresAdapter {
    fn dialect(&self) -> &'static dyn SqlDialect {
        DialectKind::Postgres.dialect()
    }

    fn fetch_documents<'a>(&'a self, query: &'a SelectQuery) -> AdapterFuture<'a, Vec<Value>> {
        Box::pin(self.fetch(query))
    }

    fn health_check(&self) -> AdapterFuture<'_, ()> {
        Box::pin(self.ping())
    }
}
