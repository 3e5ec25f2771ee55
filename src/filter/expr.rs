//! # Filter Expression AST
//!
//! Boolean predicate tree handed over by the request parser. Constructed once
//! per request, never mutated, discarded after clause generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operator::{FilterOperator, OperatorCategory, ValueArity};
use crate::error::{QueryError, QueryResult};

/// Literal attached to a filter leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Embedding and upper distance bound for vector operators
    Vector { embedding: Vec<f32>, max_distance: f64 },

    /// List of literals
    List(Vec<Value>),

    /// Single literal
    Scalar(Value),
}

impl FilterValue {
    /// Short shape name for error messages
    fn shape(&self) -> &'static str {
        match self {
            FilterValue::Vector { .. } => "vector",
            FilterValue::List(_) => "list",
            FilterValue::Scalar(_) => "scalar",
        }
    }

    /// Every literal carried by this value, in order
    pub fn literals(&self) -> Vec<Value> {
        match self {
            FilterValue::Vector {
                embedding,
                max_distance,
            } => vec![
                Value::Array(embedding.iter().map(|f| Value::from(*f as f64)).collect()),
                Value::from(*max_distance),
            ],
            FilterValue::List(items) => items.clone(),
            FilterValue::Scalar(v) => vec![v.clone()],
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => FilterValue::List(items),
            other => FilterValue::Scalar(other),
        }
    }
}

/// A filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    /// Leaf predicate on a (possibly nested) field
    Field {
        path: Vec<String>,
        operator: FilterOperator,
        value: FilterValue,
    },

    /// All children must hold
    And(Vec<FilterExpr>),

    /// At least one child must hold
    Or(Vec<FilterExpr>),

    /// Child must not hold
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Create a leaf from a dotted path (`author.name`)
    pub fn field(path: &str, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self::Field {
            path: path.split('.').map(str::to_string).collect(),
            operator,
            value: value.into(),
        }
    }

    /// Create an equality filter
    pub fn eq(path: &str, value: Value) -> Self {
        Self::field(path, FilterOperator::Eq, value)
    }

    /// Create an "in list" filter
    pub fn in_list(path: &str, values: Vec<Value>) -> Self {
        Self::field(path, FilterOperator::In, FilterValue::List(values))
    }

    /// Conjunction of filters
    pub fn and(filters: Vec<FilterExpr>) -> Self {
        Self::And(filters)
    }

    /// Disjunction of filters
    pub fn or(filters: Vec<FilterExpr>) -> Self {
        Self::Or(filters)
    }

    /// Negation of a filter
    pub fn not(filter: FilterExpr) -> Self {
        Self::Not(Box::new(filter))
    }

    /// All field paths referenced by this expression, in traversal order
    pub fn field_paths(&self) -> Vec<&[String]> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a [String]>) {
        match self {
            FilterExpr::Field { path, .. } => out.push(path),
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            FilterExpr::Not(child) => child.collect_paths(out),
        }
    }

    /// Check structural invariants: non-empty paths and groups, value shape
    /// matching the operator.
    pub fn validate(&self) -> QueryResult<()> {
        match self {
            FilterExpr::Field {
                path,
                operator,
                value,
            } => validate_leaf(path, *operator, value),
            FilterExpr::And(children) if children.is_empty() => Err(QueryError::validation(
                "'and' requires at least one condition",
            )),
            FilterExpr::Or(children) if children.is_empty() => Err(QueryError::validation(
                "'or' requires at least one condition",
            )),
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                children.iter().try_for_each(FilterExpr::validate)
            }
            FilterExpr::Not(child) => child.validate(),
        }
    }
}

fn validate_leaf(path: &[String], operator: FilterOperator, value: &FilterValue) -> QueryResult<()> {
    if path.is_empty() || path.iter().any(|s| s.is_empty()) {
        return Err(QueryError::validation("filter path must not be empty"));
    }
    let field = path.join(".");
    let mismatch = || {
        QueryError::validation(format!(
            "operator '{}' on '{}' does not accept a {} value",
            operator,
            field,
            value.shape()
        ))
    };

    match (operator.arity(), value) {
        (ValueArity::Scalar, FilterValue::Scalar(v)) => {
            if v.is_null() || v.is_array() || v.is_object() {
                return Err(mismatch());
            }
            if operator.requires_string() && !v.is_string() {
                return Err(QueryError::validation(format!(
                    "operator '{}' on '{}' requires a string value",
                    operator, field
                )));
            }
            if operator.category() == OperatorCategory::Array && v.as_u64().is_none() {
                return Err(QueryError::validation(format!(
                    "operator '{}' on '{}' requires a non-negative integer",
                    operator, field
                )));
            }
            Ok(())
        }
        (ValueArity::List, FilterValue::List(items)) => {
            let scalars_only = operator.category() == OperatorCategory::Membership;
            let bad = items
                .iter()
                .any(|v| v.is_null() || (scalars_only && (v.is_array() || v.is_object())));
            if bad {
                return Err(QueryError::validation(format!(
                    "operator '{}' on '{}' contains an invalid list element",
                    operator, field
                )));
            }
            Ok(())
        }
        (
            ValueArity::Vector,
            FilterValue::Vector {
                embedding,
                max_distance,
            },
        ) => {
            if embedding.is_empty() || !max_distance.is_finite() {
                return Err(QueryError::validation(format!(
                    "operator '{}' on '{}' requires a non-empty embedding and a finite distance",
                    operator, field
                )));
            }
            Ok(())
        }
        (ValueArity::Flag, FilterValue::Scalar(Value::Bool(_))) => Ok(()),
        _ => Err(mismatch()),
    }
}
