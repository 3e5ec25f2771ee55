//! SQLite dialect: `?` placeholders and `json_extract` paths. SQLite's LIKE
//! ignores ASCII case, so case-sensitive patterns are rewritten to GLOB.

use super::binding::StorageType;
use super::dialect::{unsupported, DialectKind, SqlDialect};
use super::postgres::length_symbol;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterOperator;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

fn json_path(segments: &[String]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        path.push('.');
        path.push_str(segment);
    }
    path
}

/// Escape GLOB metacharacters by wrapping each in a bracket class
fn escape_glob(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Translate a LIKE pattern (`%`, `_`, `\` escapes) into an equivalent GLOB
fn like_to_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&escape_glob(&escaped.to_string())),
                None => out.push('\\'),
            },
            '%' => out.push('*'),
            '_' => out.push('?'),
            other => out.push_str(&escape_glob(&other.to_string())),
        }
    }
    out
}

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn document_access(&self, column: &str, segments: &[String], _json: bool) -> String {
        format!("json_extract({}, '{}')", column, json_path(segments))
    }

    fn element_access(&self, segments: &[String], _json: bool) -> String {
        if segments.is_empty() {
            "elem.value".to_string()
        } else {
            format!("json_extract(elem.value, '{}')", json_path(segments))
        }
    }

    fn cast(&self, expr: &str, storage_type: StorageType) -> QueryResult<String> {
        let target = match storage_type {
            StorageType::Text => return Ok(expr.to_string()),
            StorageType::Integer | StorageType::Boolean => "INTEGER",
            StorageType::Numeric => "REAL",
            // No native address, time or uuid types: compare canonical text
            StorageType::Timestamp
            | StorageType::Date
            | StorageType::Uuid
            | StorageType::Inet
            | StorageType::Json => "TEXT",
            StorageType::Ltree | StorageType::Vector => {
                return Err(QueryError::internal(format!(
                    "storage type '{}' has no sqlite representation",
                    storage_type
                )))
            }
        };
        Ok(format!("CAST({} AS {})", expr, target))
    }

    fn false_literal(&self) -> &'static str {
        "0"
    }

    fn true_literal(&self) -> &'static str {
        "1"
    }

    fn generate_existential_subquery(&self, column: &str, array: &[String], predicate: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM json_each({}, '{}') AS elem WHERE {})",
            column,
            json_path(array),
            predicate
        )
    }

    fn pattern_value(&self, op: FilterOperator, literal: &str) -> String {
        match op {
            FilterOperator::Contains => format!("*{}*", escape_glob(literal)),
            FilterOperator::Startswith => format!("{}*", escape_glob(literal)),
            FilterOperator::Endswith => format!("*{}", escape_glob(literal)),
            FilterOperator::Like => like_to_glob(literal),
            FilterOperator::Icontains => format!("%{}%", super::dialect::escape_like(literal)),
            FilterOperator::Istartswith => format!("{}%", super::dialect::escape_like(literal)),
            FilterOperator::Iendswith => format!("%{}", super::dialect::escape_like(literal)),
            _ => literal.to_string(),
        }
    }

    fn generate_pattern(&self, lhs: &str, op: FilterOperator, param: &str) -> String {
        if op.is_case_insensitive() {
            format!("LOWER({}) LIKE LOWER({}) ESCAPE '\\'", lhs, param)
        } else {
            format!("{} GLOB {}", lhs, param)
        }
    }

    fn generate_special(&self, lhs: &str, op: FilterOperator, args: &[String]) -> QueryResult<String> {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();

        let sql = match op {
            FilterOperator::ArrayContains => format!(
                "NOT EXISTS (SELECT 1 FROM json_each({}) AS want WHERE want.value NOT IN (SELECT value FROM json_each({})))",
                arg(0),
                lhs
            ),
            FilterOperator::ArrayContainedBy => format!(
                "NOT EXISTS (SELECT 1 FROM json_each({}) AS have WHERE have.value NOT IN (SELECT value FROM json_each({})))",
                lhs,
                arg(0)
            ),
            FilterOperator::ArrayOverlaps => format!(
                "EXISTS (SELECT 1 FROM json_each({}) AS have WHERE have.value IN (SELECT value FROM json_each({})))",
                lhs,
                arg(0)
            ),
            FilterOperator::LenEq
            | FilterOperator::LenNeq
            | FilterOperator::LenGt
            | FilterOperator::LenGte
            | FilterOperator::LenLt
            | FilterOperator::LenLte => {
                format!("json_array_length({}) {} {}", lhs, length_symbol(op), arg(0))
            }
            other => return Err(unsupported(self.kind(), other)),
        };
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_sensitive_patterns_use_glob() {
        let d = SqliteDialect;
        assert_eq!(d.pattern_value(FilterOperator::Contains, "a*b"), "*a[*]b*");
        assert_eq!(
            d.generate_pattern("json_extract(data, '$.name')", FilterOperator::Contains, "?"),
            "json_extract(data, '$.name') GLOB ?"
        );
    }

    #[test]
    fn test_like_pattern_translated_to_glob() {
        assert_eq!(like_to_glob("a%b_c"), "a*b?c");
        assert_eq!(like_to_glob("100\\%"), "100%");
        assert_eq!(like_to_glob("x?"), "x[?]");
    }

    #[test]
    fn test_case_insensitive_pattern_lowers_both_sides() {
        let d = SqliteDialect;
        assert_eq!(d.pattern_value(FilterOperator::Icontains, "example.com"), "%example.com%");
        assert_eq!(
            d.generate_pattern("json_extract(data, '$.email')", FilterOperator::Icontains, "?"),
            "LOWER(json_extract(data, '$.email')) LIKE LOWER(?) ESCAPE '\\'"
        );
    }

    #[test]
    fn test_inet_compares_as_text() {
        let d = SqliteDialect;
        assert_eq!(d.cast("?", StorageType::Inet).unwrap(), "CAST(? AS TEXT)");
    }

    #[test]
    fn test_vector_operators_unsupported() {
        let d = SqliteDialect;
        assert!(d
            .generate_special("x", FilterOperator::L2Distance, &["?".into(), "?".into()])
            .is_err());
    }
}
