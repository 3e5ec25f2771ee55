//! SQL Server dialect: `@pN` placeholders, `JSON_VALUE`/`JSON_QUERY` paths,
//! `OPENJSON` for array traversal and explicit collations for case handling.

use super::binding::StorageType;
use super::dialect::{unsupported, DialectKind, SqlDialect};
use super::postgres::length_symbol;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterOperator;

const CASE_INSENSITIVE: &str = "Latin1_General_CI_AS";
const CASE_SENSITIVE: &str = "Latin1_General_CS_AS";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

fn json_path(segments: &[String]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        path.push('.');
        path.push_str(segment);
    }
    path
}

fn extract(base: &str, segments: &[String], json: bool) -> String {
    // JSON_VALUE returns NULL for arrays and objects
    let function = if json { "JSON_QUERY" } else { "JSON_VALUE" };
    format!("{}({}, '{}')", function, base, json_path(segments))
}

impl SqlDialect for SqlServerDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlserver
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn document_access(&self, column: &str, segments: &[String], json: bool) -> String {
        extract(column, segments, json)
    }

    fn element_access(&self, segments: &[String], json: bool) -> String {
        if segments.is_empty() {
            "elem.value".to_string()
        } else {
            extract("elem.value", segments, json)
        }
    }

    fn cast(&self, expr: &str, storage_type: StorageType) -> QueryResult<String> {
        let target = match storage_type {
            StorageType::Text => return Ok(expr.to_string()),
            StorageType::Integer => "BIGINT",
            StorageType::Numeric => "DECIMAL(38, 10)",
            StorageType::Boolean => "BIT",
            StorageType::Timestamp => "DATETIMEOFFSET",
            StorageType::Date => "DATE",
            StorageType::Uuid => "UNIQUEIDENTIFIER",
            StorageType::Inet => "VARCHAR(45)",
            StorageType::Json => "NVARCHAR(MAX)",
            StorageType::Ltree | StorageType::Vector => {
                return Err(QueryError::internal(format!(
                    "storage type '{}' has no sqlserver representation",
                    storage_type
                )))
            }
        };
        Ok(format!("CAST({} AS {})", expr, target))
    }

    fn not_equal(&self) -> &'static str {
        "<>"
    }

    fn false_literal(&self) -> &'static str {
        "1 = 0"
    }

    fn true_literal(&self) -> &'static str {
        "1 = 1"
    }

    fn generate_existential_subquery(&self, column: &str, array: &[String], predicate: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM OPENJSON({}, '{}') AS elem WHERE {})",
            column,
            json_path(array),
            predicate
        )
    }

    fn generate_pattern(&self, lhs: &str, op: FilterOperator, param: &str) -> String {
        let collation = if op.is_case_insensitive() {
            CASE_INSENSITIVE
        } else {
            CASE_SENSITIVE
        };
        format!("{} COLLATE {} LIKE {} ESCAPE '\\'", lhs, collation, param)
    }

    fn generate_special(&self, lhs: &str, op: FilterOperator, args: &[String]) -> QueryResult<String> {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();

        let sql = match op {
            FilterOperator::ArrayContains => format!(
                "NOT EXISTS (SELECT 1 FROM OPENJSON({}) AS want WHERE want.value NOT IN (SELECT value FROM OPENJSON({})))",
                arg(0),
                lhs
            ),
            FilterOperator::ArrayContainedBy => format!(
                "NOT EXISTS (SELECT 1 FROM OPENJSON({}) AS have WHERE have.value NOT IN (SELECT value FROM OPENJSON({})))",
                lhs,
                arg(0)
            ),
            FilterOperator::ArrayOverlaps => format!(
                "EXISTS (SELECT 1 FROM OPENJSON({}) AS have WHERE have.value IN (SELECT value FROM OPENJSON({})))",
                lhs,
                arg(0)
            ),
            FilterOperator::LenEq
            | FilterOperator::LenNeq
            | FilterOperator::LenGt
            | FilterOperator::LenGte
            | FilterOperator::LenLt
            | FilterOperator::LenLte => {
                let symbol = match length_symbol(op) {
                    "!=" => "<>",
                    other => other,
                };
                format!("(SELECT COUNT(*) FROM OPENJSON({})) {} {}", lhs, symbol, arg(0))
            }
            other => return Err(unsupported(self.kind(), other)),
        };
        Ok(sql)
    }
}
