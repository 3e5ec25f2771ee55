//! SQLite adapter over a sqlx pool. Parameters bind with their native
//! types; the document column holds JSON text.

use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::query::Query;
use sqlx::{Row, Sqlite};
use tracing::trace;

use super::adapter::{with_timeout, AdapterFuture, DatabaseAdapter};
use super::query::SelectQuery;
use crate::config::DatabaseConfig;
use crate::error::{QueryError, QueryResult};
use crate::sql::{DialectKind, SqlDialect};

pub struct SqliteAdapter {
    pool: SqlitePool,
    statement_timeout: Duration,
}

impl SqliteAdapter {
    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> QueryResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await?;
        Ok(Self::from_pool(pool, config.statement_timeout()))
    }

    pub fn from_pool(pool: SqlitePool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_param<'q>(
    statement: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => statement.bind(None::<String>),
        Value::Bool(b) => statement.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => statement.bind(i),
            None => statement.bind(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => statement.bind(s.clone()),
        // Arrays and objects are consumed by json_each as JSON text
        other => statement.bind(other.to_string()),
    }
}

impl SqliteAdapter {
    async fn fetch(&self, query: &SelectQuery) -> QueryResult<Vec<Value>> {
        let rendered = query.to_sql(self.dialect())?;
        trace!(sql = %rendered.sql, params = rendered.params.len(), "executing document query");

        let mut statement = sqlx::query(&rendered.sql);
        for param in &rendered.params {
            statement = bind_param(statement, param);
        }

        let rows = with_timeout(self.statement_timeout, async {
            statement.fetch_all(&self.pool).await.map_err(QueryError::from)
        })
        .await?;

        rows.iter()
            .map(|row| -> QueryResult<Value> {
                let text: String = row.try_get(0)?;
                Ok(serde_json::from_str(&text)?)
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

impl DatabaseAdapter for SqliteAdapter {
    fn dialect(&self) -> &'static dyn SqlDialect {
        DialectKind::Sqlite.dialect()
    }

    fn fetch_documents<'a>(&'a self, query: &'a SelectQuery) -> AdapterFuture<'a, Vec<Value>> {
        Box::pin(self.fetch(query))
    }

    fn health_check(&self) -> AdapterFuture<'_, ()> {
        Box::pin(self.ping())
    }
}
