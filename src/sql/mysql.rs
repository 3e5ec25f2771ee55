//! MySQL dialect: `?` placeholders, `JSON_EXTRACT` paths, `LOWER()` for
//! case-insensitive patterns and `INET6_ATON` for address comparison.

use super::binding::StorageType;
use super::dialect::{unsupported, DialectKind, SqlDialect};
use super::postgres::length_symbol;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterOperator;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

fn json_path(segments: &[String]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        path.push('.');
        path.push_str(segment);
    }
    path
}

fn extract(base: &str, segments: &[String], json: bool) -> String {
    let raw = format!("JSON_EXTRACT({}, '{}')", base, json_path(segments));
    if json {
        raw
    } else {
        format!("JSON_UNQUOTE({})", raw)
    }
}

impl SqlDialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn document_access(&self, column: &str, segments: &[String], json: bool) -> String {
        extract(column, segments, json)
    }

    fn element_access(&self, segments: &[String], json: bool) -> String {
        if segments.is_empty() && json {
            "jt.elem".to_string()
        } else {
            extract("jt.elem", segments, json)
        }
    }

    fn cast(&self, expr: &str, storage_type: StorageType) -> QueryResult<String> {
        let sql = match storage_type {
            StorageType::Text => expr.to_string(),
            StorageType::Integer => format!("CAST({} AS SIGNED)", expr),
            StorageType::Numeric => format!("CAST({} AS DECIMAL(38, 10))", expr),
            // Unquoted JSON booleans read back as 'true'/'false'
            StorageType::Boolean => format!("(LOWER({}) IN ('true', '1'))", expr),
            StorageType::Timestamp => format!("CAST({} AS DATETIME(6))", expr),
            StorageType::Date => format!("CAST({} AS DATE)", expr),
            StorageType::Uuid => format!("CAST({} AS CHAR(36))", expr),
            StorageType::Inet => format!("INET6_ATON({})", expr),
            StorageType::Json => format!("CAST({} AS JSON)", expr),
            StorageType::Ltree | StorageType::Vector => {
                return Err(QueryError::internal(format!(
                    "storage type '{}' has no mysql representation",
                    storage_type
                )))
            }
        };
        Ok(sql)
    }

    fn generate_existential_subquery(&self, column: &str, array: &[String], predicate: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM JSON_TABLE({}, '{}[*]' COLUMNS (elem JSON PATH '$')) AS jt WHERE {})",
            column,
            json_path(array),
            predicate
        )
    }

    // Backslash is already the LIKE escape here, and `'\'` would open an
    // unterminated literal under the default sql_mode
    fn generate_pattern(&self, lhs: &str, op: FilterOperator, param: &str) -> String {
        if op.is_case_insensitive() {
            format!("LOWER({}) LIKE LOWER({})", lhs, param)
        } else {
            format!("{} LIKE {}", lhs, param)
        }
    }

    fn generate_special(&self, lhs: &str, op: FilterOperator, args: &[String]) -> QueryResult<String> {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();

        let sql = match op {
            FilterOperator::ArrayContains => {
                format!("JSON_CONTAINS({}, CAST({} AS JSON))", lhs, arg(0))
            }
            FilterOperator::ArrayContainedBy => {
                format!("JSON_CONTAINS(CAST({} AS JSON), {})", arg(0), lhs)
            }
            FilterOperator::ArrayOverlaps => {
                format!("JSON_OVERLAPS({}, CAST({} AS JSON))", lhs, arg(0))
            }
            FilterOperator::LenEq
            | FilterOperator::LenNeq
            | FilterOperator::LenGt
            | FilterOperator::LenGte
            | FilterOperator::LenLt
            | FilterOperator::LenLte => {
                format!("JSON_LENGTH({}) {} {}", lhs, length_symbol(op), arg(0))
            }
            FilterOperator::IsIpv4 => format!("IS_IPV4({})", lhs),
            FilterOperator::IsIpv6 => format!("IS_IPV6({})", lhs),
            other => return Err(unsupported(self.kind(), other)),
        };
        Ok(sql)
    }
}
