//! # SQL Dialects
//!
//! Capability interface implemented once per backend. The clause generator
//! walks the filter tree without knowing the backend and asks the dialect
//! for every piece of text it emits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::binding::StorageType;
use super::{mysql::MySqlDialect, postgres::PostgresDialect, sqlite::SqliteDialect, sqlserver::SqlServerDialect};
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterOperator;

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    #[serde(alias = "postgresql")]
    Postgres,
    Mysql,
    Sqlite,
    #[serde(alias = "mssql")]
    Sqlserver,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Sqlserver => "sqlserver",
        }
    }

    /// Dialect implementation for this backend
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            DialectKind::Postgres => &PostgresDialect,
            DialectKind::Mysql => &MySqlDialect,
            DialectKind::Sqlite => &SqliteDialect,
            DialectKind::Sqlserver => &SqlServerDialect,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" => Ok(DialectKind::Mysql),
            "sqlite" => Ok(DialectKind::Sqlite),
            "sqlserver" | "mssql" => Ok(DialectKind::Sqlserver),
            other => Err(QueryError::validation(format!("unknown dialect '{}'", other))),
        }
    }
}

/// Error for an operator the backend cannot express
pub fn unsupported(kind: DialectKind, op: FilterOperator) -> QueryError {
    QueryError::validation(format!("operator '{}' is not supported by {}", op, kind))
}

/// Escape `\`, `%` and `_` so the literal matches itself under LIKE with
/// `\` as the escape character.
pub fn escape_like(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Backend-specific SQL text production.
///
/// All `lhs` arguments are access expressions built by the dialect itself;
/// all `rhs`/`args` are placeholders. Dialects never see caller literals
/// except through [`SqlDialect::pattern_value`], whose output is bound.
pub trait SqlDialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// Extract a value from the document column. `json` keeps the value
    /// JSON-typed (arrays, objects) instead of extracting text.
    fn document_access(&self, column: &str, segments: &[String], json: bool) -> String;

    /// Extract a value from the current element inside an existential
    /// sub-query. Empty `segments` address the element itself.
    fn element_access(&self, segments: &[String], json: bool) -> String;

    /// Cast an expression to the declared storage type
    fn cast(&self, expr: &str, storage_type: StorageType) -> QueryResult<String>;

    /// `EXISTS` test over the elements of a document array
    fn generate_existential_subquery(&self, column: &str, array: &[String], predicate: &str)
        -> String;

    /// Apply `op` (array, vector, full-text, network, hierarchy) to `lhs`
    fn generate_special(&self, lhs: &str, op: FilterOperator, args: &[String])
        -> QueryResult<String>;

    fn not_equal(&self) -> &'static str {
        "!="
    }

    fn false_literal(&self) -> &'static str {
        "FALSE"
    }

    fn true_literal(&self) -> &'static str {
        "TRUE"
    }

    fn generate_comparison(&self, lhs: &str, op: FilterOperator, rhs: &str) -> QueryResult<String> {
        let symbol = match op {
            FilterOperator::Eq => "=",
            FilterOperator::Neq => self.not_equal(),
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            other => return Err(unsupported(self.kind(), other)),
        };
        Ok(format!("{} {} {}", lhs, symbol, rhs))
    }

    fn generate_membership(&self, lhs: &str, negated: bool, items: &[String]) -> String {
        let keyword = if negated { "NOT IN" } else { "IN" };
        format!("{} {} ({})", lhs, keyword, items.join(", "))
    }

    fn generate_null_check(&self, lhs: &str, is_null: bool) -> String {
        if is_null {
            format!("{} IS NULL", lhs)
        } else {
            format!("{} IS NOT NULL", lhs)
        }
    }

    /// Value bound for a pattern operator. Substring operators escape the
    /// literal and add the wildcards; `like`/`ilike` pass the pattern through.
    fn pattern_value(&self, op: FilterOperator, literal: &str) -> String {
        match op {
            FilterOperator::Contains | FilterOperator::Icontains => {
                format!("%{}%", escape_like(literal))
            }
            FilterOperator::Startswith | FilterOperator::Istartswith => {
                format!("{}%", escape_like(literal))
            }
            FilterOperator::Endswith | FilterOperator::Iendswith => {
                format!("%{}", escape_like(literal))
            }
            _ => literal.to_string(),
        }
    }

    fn generate_pattern(&self, lhs: &str, op: FilterOperator, param: &str) -> String {
        if op.is_case_insensitive() {
            format!("LOWER({}) LIKE LOWER({}) ESCAPE '\\'", lhs, param)
        } else {
            format!("{} LIKE {} ESCAPE '\\'", lhs, param)
        }
    }
}
