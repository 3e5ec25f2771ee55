//! # Document Queries
//!
//! `SELECT <document column> FROM <source>` with an optional generated WHERE
//! clause, ordering and pagination. Limit and offset are bound like every
//! other value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryResult;
use crate::sql::binding::{validate_identifier, validate_qualified_identifier, DEFAULT_DOCUMENT_COLUMN};
use crate::sql::{DialectKind, SqlClause, SqlDialect};

/// Ordering on a real column of the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,

    #[serde(default)]
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Retrieval of one document per matched row
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// View or table, optionally schema-qualified
    pub source: String,
    pub document_column: String,
    pub clause: Option<SqlClause>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Final statement text and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl SelectQuery {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            document_column: DEFAULT_DOCUMENT_COLUMN.to_string(),
            clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn document_column(mut self, column: impl Into<String>) -> Self {
        self.document_column = column.into();
        self
    }

    pub fn filter(mut self, clause: SqlClause) -> Self {
        self.clause = Some(clause);
        self
    }

    pub fn order_by(mut self, order: Vec<OrderBy>) -> Self {
        self.order_by = order;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render for `dialect`. Clause placeholders keep their numbers; limit
    /// and offset continue after them.
    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> QueryResult<RenderedQuery> {
        validate_qualified_identifier(&self.source)?;
        validate_identifier(&self.document_column)?;
        for order in &self.order_by {
            validate_identifier(&order.column)?;
        }

        let mut sql = format!("SELECT {} FROM {}", self.document_column, self.source);
        let mut params = Vec::new();

        if let Some(clause) = &self.clause {
            sql.push_str(" WHERE ");
            sql.push_str(&clause.text);
            params.extend(clause.params.iter().cloned());
        }

        let kind = dialect.kind();
        let paginated = self.limit.is_some() || self.offset.is_some();

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.column, if o.descending { "DESC" } else { "ASC" }))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        } else if kind == DialectKind::Sqlserver && paginated {
            // OFFSET/FETCH is only valid after ORDER BY
            sql.push_str(" ORDER BY (SELECT NULL)");
        }

        let bind = |value: u64, params: &mut Vec<Value>| {
            params.push(Value::from(value));
            dialect.placeholder(params.len())
        };

        match kind {
            DialectKind::Sqlserver => {
                if paginated {
                    let offset = bind(self.offset.unwrap_or(0), &mut params);
                    sql.push_str(&format!(" OFFSET {} ROWS", offset));
                    if let Some(limit) = self.limit {
                        let limit = bind(limit, &mut params);
                        sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                    }
                }
            }
            DialectKind::Postgres => {
                // Parameters travel as text; LIMIT needs an integer
                if let Some(limit) = self.limit {
                    let limit = bind(limit, &mut params);
                    sql.push_str(&format!(" LIMIT ({})::bigint", limit));
                }
                if let Some(offset) = self.offset {
                    let offset = bind(offset, &mut params);
                    sql.push_str(&format!(" OFFSET ({})::bigint", offset));
                }
            }
            DialectKind::Mysql | DialectKind::Sqlite => {
                if paginated {
                    // OFFSET requires LIMIT; an absent limit means "all rows"
                    let limit = bind(self.limit.unwrap_or(i64::MAX as u64), &mut params);
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                if let Some(offset) = self.offset {
                    let offset = bind(offset, &mut params);
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
        }

        Ok(RenderedQuery { sql, params })
    }
}
