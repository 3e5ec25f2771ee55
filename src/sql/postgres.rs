//! PostgreSQL dialect: `$n` placeholders, `->`/`->>` document access,
//! `::type` casts, and the jsonb, pgvector, tsquery, inet and ltree operators.

use super::binding::StorageType;
use super::dialect::{unsupported, DialectKind, SqlDialect};
use crate::error::QueryResult;
use crate::filter::FilterOperator;

/// RFC 1918 and IPv4 link-local, then IPv6 unique-local and link-local.
/// `<<` is false across address families, so one list serves both.
const PRIVATE_RANGES: [&str; 6] = [
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "fc00::/7",
    "fe80::/10",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

fn json_chain(base: &str, segments: &[String], json: bool) -> String {
    let mut expr = base.to_string();
    for (i, segment) in segments.iter().enumerate() {
        let arrow = if i + 1 == segments.len() && !json { "->>" } else { "->" };
        expr.push_str(&format!("{}'{}'", arrow, segment));
    }
    expr
}

fn private_ranges(inet: &str) -> String {
    let tests: Vec<String> = PRIVATE_RANGES
        .iter()
        .map(|range| format!("{} << '{}'::inet", inet, range))
        .collect();
    format!("({})", tests.join(" OR "))
}

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn document_access(&self, column: &str, segments: &[String], json: bool) -> String {
        json_chain(column, segments, json)
    }

    fn element_access(&self, segments: &[String], json: bool) -> String {
        match (segments.is_empty(), json) {
            (true, true) => "elem".to_string(),
            (true, false) => "elem #>> '{}'".to_string(),
            (false, _) => json_chain("elem", segments, json),
        }
    }

    fn cast(&self, expr: &str, storage_type: StorageType) -> QueryResult<String> {
        let target = match storage_type {
            StorageType::Text => return Ok(expr.to_string()),
            StorageType::Integer => "bigint",
            StorageType::Numeric => "numeric",
            StorageType::Boolean => "boolean",
            StorageType::Timestamp => "timestamptz",
            StorageType::Date => "date",
            StorageType::Uuid => "uuid",
            StorageType::Inet => "inet",
            StorageType::Ltree => "ltree",
            StorageType::Vector => "vector",
            StorageType::Json => "jsonb",
        };
        Ok(format!("({})::{}", expr, target))
    }

    fn generate_existential_subquery(&self, column: &str, array: &[String], predicate: &str) -> String {
        format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements({}) AS elem WHERE {})",
            json_chain(column, array, true),
            predicate
        )
    }

    fn generate_pattern(&self, lhs: &str, op: FilterOperator, param: &str) -> String {
        let keyword = if op.is_case_insensitive() { "ILIKE" } else { "LIKE" };
        format!("{} {} {}", lhs, keyword, param)
    }

    fn generate_special(&self, lhs: &str, op: FilterOperator, args: &[String]) -> QueryResult<String> {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        let inet = format!("({})::inet", lhs);

        let sql = match op {
            FilterOperator::ArrayContains => format!("({})::jsonb @> ({})::jsonb", lhs, arg(0)),
            FilterOperator::ArrayContainedBy => format!("({})::jsonb <@ ({})::jsonb", lhs, arg(0)),
            // Element-wise jsonb equality, so numbers and objects overlap too
            FilterOperator::ArrayOverlaps => format!(
                "EXISTS (SELECT 1 FROM jsonb_array_elements(({})::jsonb) AS a \
                 JOIN jsonb_array_elements(({})::jsonb) AS b ON a = b)",
                lhs,
                arg(0)
            ),
            FilterOperator::LenEq
            | FilterOperator::LenNeq
            | FilterOperator::LenGt
            | FilterOperator::LenGte
            | FilterOperator::LenLt
            | FilterOperator::LenLte => {
                let symbol = length_symbol(op);
                format!("jsonb_array_length(({})::jsonb) {} ({})::integer", lhs, symbol, arg(0))
            }
            FilterOperator::CosineDistance
            | FilterOperator::L2Distance
            | FilterOperator::L1Distance
            | FilterOperator::InnerProduct => {
                let symbol = match op {
                    FilterOperator::CosineDistance => "<=>",
                    FilterOperator::L2Distance => "<->",
                    FilterOperator::L1Distance => "<+>",
                    _ => "<#>",
                };
                format!(
                    "(({})::vector {} ({})::vector) < ({})::float8",
                    lhs,
                    symbol,
                    arg(0),
                    arg(1)
                )
            }
            FilterOperator::Matches => format!("to_tsvector({}) @@ to_tsquery({})", lhs, arg(0)),
            FilterOperator::PlainQuery => {
                format!("to_tsvector({}) @@ plainto_tsquery({})", lhs, arg(0))
            }
            FilterOperator::PhraseQuery => {
                format!("to_tsvector({}) @@ phraseto_tsquery({})", lhs, arg(0))
            }
            FilterOperator::WebsearchQuery => {
                format!("to_tsvector({}) @@ websearch_to_tsquery({})", lhs, arg(0))
            }
            FilterOperator::IsIpv4 => format!("family({}) = 4", inet),
            FilterOperator::IsIpv6 => format!("family({}) = 6", inet),
            FilterOperator::IsPrivate => private_ranges(&inet),
            FilterOperator::IsPublic => format!("NOT {}", private_ranges(&inet)),
            FilterOperator::IsLoopback => format!(
                "({inet} << '127.0.0.0/8'::inet OR {inet} = '::1'::inet)",
                inet = inet
            ),
            FilterOperator::InSubnet => format!("{} << ({})::inet", inet, arg(0)),
            FilterOperator::ContainsSubnet => format!("{} >> ({})::inet", inet, arg(0)),
            FilterOperator::ContainsIp => format!("{} >>= ({})::inet", inet, arg(0)),
            FilterOperator::AncestorOf => format!("({})::ltree @> ({})::ltree", lhs, arg(0)),
            FilterOperator::DescendantOf => format!("({})::ltree <@ ({})::ltree", lhs, arg(0)),
            FilterOperator::MatchesLquery => format!("({})::ltree ~ ({})::lquery", lhs, arg(0)),
            other => return Err(unsupported(self.kind(), other)),
        };
        Ok(sql)
    }
}

/// Comparison symbol for the array length operators
pub(crate) fn length_symbol(op: FilterOperator) -> &'static str {
    match op {
        FilterOperator::LenEq => "=",
        FilterOperator::LenNeq => "!=",
        FilterOperator::LenGt => ">",
        FilterOperator::LenGte => ">=",
        FilterOperator::LenLt => "<",
        _ => "<=",
    }
}
