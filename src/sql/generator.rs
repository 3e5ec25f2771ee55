//! # WHERE Clause Generator
//!
//! Recursive descent over a [`FilterExpr`], producing clause text plus the
//! ordered parameters it references. Caller literals only ever reach the
//! parameter list.

use serde_json::Value;

use super::binding::{BindingTable, FieldBinding, StorageAccess};
use super::dialect::SqlDialect;
use crate::error::{QueryError, QueryResult};
use crate::filter::{FilterExpr, FilterOperator, FilterValue, OperatorCategory, ValueArity};

/// Generated WHERE fragment
#[derive(Debug, Clone, PartialEq)]
pub struct SqlClause {
    /// Clause text with placeholders
    pub text: String,

    /// Parameters, in placeholder order
    pub params: Vec<Value>,
}

/// Placeholder allocation for one generation pass
struct Params<'d> {
    dialect: &'d dyn SqlDialect,
    values: Vec<Value>,
}

impl<'d> Params<'d> {
    fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

/// Compiles filter expressions for one dialect and binding table
pub struct WhereGenerator<'a> {
    dialect: &'a dyn SqlDialect,
    bindings: &'a BindingTable,
}

impl<'a> WhereGenerator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, bindings: &'a BindingTable) -> Self {
        Self { dialect, bindings }
    }

    /// Generate a WHERE fragment; placeholders are numbered from 1.
    pub fn generate(&self, expr: &FilterExpr) -> QueryResult<SqlClause> {
        expr.validate()?;

        let mut params = Params {
            dialect: self.dialect,
            values: Vec::new(),
        };
        let text = self.visit(expr, &mut params)?;

        Ok(SqlClause {
            text,
            params: params.values,
        })
    }

    fn visit(&self, expr: &FilterExpr, params: &mut Params<'_>) -> QueryResult<String> {
        match expr {
            FilterExpr::Field {
                path,
                operator,
                value,
            } => {
                let binding = self.bindings.resolve(path)?;
                self.leaf(binding, *operator, value, params)
            }
            FilterExpr::And(children) => self.group(children, "AND", params),
            FilterExpr::Or(children) => self.group(children, "OR", params),
            FilterExpr::Not(child) => Ok(format!("NOT ({})", self.visit(child, params)?)),
        }
    }

    fn group(&self, children: &[FilterExpr], joiner: &str, params: &mut Params<'_>) -> QueryResult<String> {
        if children.is_empty() {
            return Err(QueryError::validation(format!(
                "'{}' requires at least one condition",
                joiner.to_lowercase()
            )));
        }
        let parts = children
            .iter()
            .map(|child| self.visit(child, params))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(format!("({})", parts.join(format!(" {} ", joiner).as_str())))
    }

    fn leaf(
        &self,
        binding: &FieldBinding,
        op: FilterOperator,
        value: &FilterValue,
        params: &mut Params<'_>,
    ) -> QueryResult<String> {
        let json = op.category() == OperatorCategory::Array;
        let column = self.bindings.document_column();

        match &binding.access {
            StorageAccess::Column(name) => self.predicate(name, binding, op, value, params),
            StorageAccess::Document(segments) => {
                let lhs = self.dialect.document_access(column, segments, json);
                self.predicate(&lhs, binding, op, value, params)
            }
            StorageAccess::ArrayElement { array, element } => {
                let lhs = self.dialect.element_access(element, json);
                let predicate = self.predicate(&lhs, binding, op, value, params)?;
                Ok(self
                    .dialect
                    .generate_existential_subquery(column, array, &predicate))
            }
        }
    }

    fn predicate(
        &self,
        lhs: &str,
        binding: &FieldBinding,
        op: FilterOperator,
        value: &FilterValue,
        params: &mut Params<'_>,
    ) -> QueryResult<String> {
        let dialect = self.dialect;
        let storage_type = binding.storage_type;

        match (op.category(), value) {
            (OperatorCategory::Comparison, FilterValue::Scalar(literal)) => {
                let rhs = params.bind(literal.clone());
                dialect.generate_comparison(
                    &dialect.cast(lhs, storage_type)?,
                    op,
                    &dialect.cast(&rhs, storage_type)?,
                )
            }
            (OperatorCategory::Membership, FilterValue::List(items)) => {
                let negated = op == FilterOperator::Nin;
                if items.is_empty() {
                    let literal = if negated {
                        dialect.true_literal()
                    } else {
                        dialect.false_literal()
                    };
                    return Ok(literal.to_string());
                }
                // Every element gets the same cast as the access expression
                let placeholders = items
                    .iter()
                    .map(|item| {
                        let placeholder = params.bind(item.clone());
                        dialect.cast(&placeholder, storage_type)
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(dialect.generate_membership(
                    &dialect.cast(lhs, storage_type)?,
                    negated,
                    &placeholders,
                ))
            }
            (OperatorCategory::Pattern, FilterValue::Scalar(Value::String(literal))) => {
                let placeholder = params.bind(Value::String(dialect.pattern_value(op, literal)));
                Ok(dialect.generate_pattern(lhs, op, &placeholder))
            }
            (OperatorCategory::Null, FilterValue::Scalar(Value::Bool(is_null))) => {
                Ok(dialect.generate_null_check(lhs, *is_null))
            }
            (_, FilterValue::Scalar(Value::Bool(flag))) if op.arity() == ValueArity::Flag => {
                let sql = dialect.generate_special(lhs, op, &[])?;
                if *flag {
                    Ok(sql)
                } else {
                    Ok(format!("NOT ({})", sql))
                }
            }
            (_, FilterValue::Scalar(literal)) => {
                let arg = params.bind(literal.clone());
                dialect.generate_special(lhs, op, &[arg])
            }
            (_, FilterValue::List(items)) => {
                let arg = params.bind(Value::Array(items.clone()));
                dialect.generate_special(lhs, op, &[arg])
            }
            (
                _,
                FilterValue::Vector {
                    embedding,
                    max_distance,
                },
            ) => {
                let vector = params.bind(Value::String(vector_literal(embedding)));
                let bound = params.bind(Value::from(*max_distance));
                dialect.generate_special(lhs, op, &[vector, bound])
            }
        }
    }
}

/// Text form of an embedding (`[0.1,0.2]`), accepted by vector casts
fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::binding::StorageType;
    use crate::sql::dialect::DialectKind;
    use serde_json::json;

    fn bindings() -> BindingTable {
        BindingTable::default()
            .with_document_field("email", StorageType::Text)
            .unwrap()
            .with_document_field("age", StorageType::Integer)
            .unwrap()
            .with_document_field("ip_address", StorageType::Inet)
            .unwrap()
            .with_document_field("deleted_at", StorageType::Timestamp)
            .unwrap()
            .with_column("id", "id", StorageType::Uuid)
            .unwrap()
            .with_array_element("comments.author.name", "comments", "author.name", StorageType::Text)
            .unwrap()
    }

    fn generate(kind: DialectKind, expr: &FilterExpr) -> QueryResult<SqlClause> {
        let table = bindings();
        WhereGenerator::new(kind.dialect(), &table).generate(expr)
    }

    #[test]
    fn test_simple_equality() {
        let clause = generate(DialectKind::Postgres, &FilterExpr::eq("email", json!("a@b.c"))).unwrap();
        assert_eq!(clause.text, "data->>'email' = $1");
        assert_eq!(clause.params, vec![json!("a@b.c")]);
    }

    #[test]
    fn test_cast_applied_to_both_sides() {
        let clause = generate(DialectKind::Postgres, &FilterExpr::eq("ip_address", json!("10.0.0.1"))).unwrap();
        assert_eq!(clause.text, "(data->>'ip_address')::inet = ($1)::inet");
    }

    #[test]
    fn test_in_list_casts_every_element() {
        let expr = FilterExpr::in_list("age", vec![json!(18), json!(21), json!(30)]);
        let clause = generate(DialectKind::Postgres, &expr).unwrap();
        assert_eq!(
            clause.text,
            "(data->>'age')::bigint IN (($1)::bigint, ($2)::bigint, ($3)::bigint)"
        );
        assert_eq!(clause.params.len(), 3);
    }

    #[test]
    fn test_empty_membership_lists() {
        let clause = generate(DialectKind::Postgres, &FilterExpr::in_list("email", vec![])).unwrap();
        assert_eq!(clause.text, "FALSE");
        assert!(clause.params.is_empty());

        let nin = FilterExpr::field("email", FilterOperator::Nin, FilterValue::List(vec![]));
        let clause = generate(DialectKind::Sqlserver, &nin).unwrap();
        assert_eq!(clause.text, "1 = 1");
    }

    #[test]
    fn test_boolean_groups_parenthesized() {
        let expr = FilterExpr::or(vec![
            FilterExpr::eq("email", json!("a")),
            FilterExpr::not(FilterExpr::field("age", FilterOperator::Gt, json!(40))),
        ]);
        let clause = generate(DialectKind::Sqlite, &expr).unwrap();
        assert_eq!(
            clause.text,
            "(json_extract(data, '$.email') = ? OR NOT (CAST(json_extract(data, '$.age') AS INTEGER) > CAST(? AS INTEGER)))"
        );
    }

    #[test]
    fn test_empty_group_is_validation_error() {
        let err = generate(DialectKind::Postgres, &FilterExpr::and(vec![])).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_pattern_wildcards_live_in_parameter() {
        let expr = FilterExpr::field("email", FilterOperator::Icontains, json!("example.com"));
        let clause = generate(DialectKind::Postgres, &expr).unwrap();
        assert_eq!(clause.text, "data->>'email' ILIKE $1");
        assert_eq!(clause.params, vec![json!("%example.com%")]);
    }

    #[test]
    fn test_isnull_flag() {
        let expr = FilterExpr::field("deleted_at", FilterOperator::Isnull, json!(false));
        let clause = generate(DialectKind::Mysql, &expr).unwrap();
        assert_eq!(
            clause.text,
            "JSON_UNQUOTE(JSON_EXTRACT(data, '$.deleted_at')) IS NOT NULL"
        );
    }

    #[test]
    fn test_network_flag_false_negates() {
        let expr = FilterExpr::field("ip_address", FilterOperator::IsPrivate, json!(false));
        let clause = generate(DialectKind::Postgres, &expr).unwrap();
        assert!(clause.text.starts_with("NOT (((data->>'ip_address')::inet << '10.0.0.0/8'::inet"));
    }

    #[test]
    fn test_array_element_uses_existential_subquery() {
        let expr = FilterExpr::eq("comments.author.name", json!("A"));
        let clause = generate(DialectKind::Postgres, &expr).unwrap();
        assert_eq!(
            clause.text,
            "EXISTS (SELECT 1 FROM jsonb_array_elements(data->'comments') AS elem WHERE elem->'author'->>'name' = $1)"
        );
    }

    #[test]
    fn test_unbound_field_rejected() {
        let err = generate(DialectKind::Postgres, &FilterExpr::eq("password_hash", json!("x"))).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_unsupported_operator_for_backend() {
        let expr = FilterExpr::field("email", FilterOperator::Matches, json!("rust"));
        assert!(generate(DialectKind::Postgres, &expr).is_ok());
        let err = generate(DialectKind::Sqlite, &expr).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_mismatched_value_shape_is_validation_error() {
        let non_string_pattern = FilterExpr::field("email", FilterOperator::Icontains, json!(5));
        let list_comparison = FilterExpr::field("email", FilterOperator::Eq, FilterValue::List(vec![json!("a")]));
        let vector_membership = FilterExpr::field(
            "email",
            FilterOperator::In,
            FilterValue::Vector {
                embedding: vec![0.1],
                max_distance: 1.0,
            },
        );
        for expr in [non_string_pattern, list_comparison, vector_membership] {
            let err = generate(DialectKind::Postgres, &expr).unwrap_err();
            assert!(matches!(err, QueryError::Validation(_)), "{:?}", expr);
        }
    }

    #[test]
    fn test_placeholder_numbering_across_tree() {
        let expr = FilterExpr::and(vec![
            FilterExpr::eq("email", json!("a")),
            FilterExpr::in_list("email", vec![json!("b"), json!("c")]),
            FilterExpr::field("age", FilterOperator::Lte, json!(9)),
        ]);
        let clause = generate(DialectKind::Sqlserver, &expr).unwrap();
        assert!(clause.text.contains("@p1"));
        assert!(clause.text.contains("@p4"));
        assert!(!clause.text.contains("@p5"));
        assert_eq!(clause.params.len(), 4);
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, 1.0]), "[0.5,1]");
    }
}
