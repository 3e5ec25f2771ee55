//! # Document Projection
//!
//! Slices a retrieved document down to the selected fields, renames aliased
//! fields, and drops fields the caller may not see.
//!
//! ## Invariants
//! - The input document is never mutated; only selected values are copied.
//! - Denied fields are absent from the output (no key, not `null`).
//! - Selected but missing fields are present as `null`.
//! - A shape mismatch (scalar where an object or list is selected) is an
//!   internal error: retrieval and projection disagree about the schema.

use serde_json::{Map, Value};

use crate::auth::AuthorizationMask;
use crate::error::{QueryError, QueryResult};
use crate::selection::{SelectionKind, SelectionSet};

/// Meta field answered with the current type name
pub const TYPENAME_FIELD: &str = "__typename";

/// Project one document of type `type_name`
pub fn project(
    document: &Value,
    selection: &SelectionSet,
    mask: &AuthorizationMask,
    type_name: &str,
) -> QueryResult<Value> {
    match document {
        Value::Object(object) => project_object(object, selection, mask, type_name),
        other => Err(shape_error(type_name, "object", other)),
    }
}

/// Project each retrieved row, preserving order
pub fn project_rows(
    rows: &[Value],
    selection: &SelectionSet,
    mask: &AuthorizationMask,
    type_name: &str,
) -> QueryResult<Vec<Value>> {
    rows.iter()
        .map(|row| project(row, selection, mask, type_name))
        .collect()
}

fn project_object(
    object: &Map<String, Value>,
    selection: &SelectionSet,
    mask: &AuthorizationMask,
    type_name: &str,
) -> QueryResult<Value> {
    let mut output = Map::with_capacity(selection.len());

    for field in selection.iter() {
        if field.name == TYPENAME_FIELD {
            output.insert(
                field.response_key().to_string(),
                Value::String(type_name.to_string()),
            );
            continue;
        }

        if !mask.is_allowed(type_name, &field.name) {
            continue;
        }

        let value = object.get(&field.name).unwrap_or(&Value::Null);
        let projected = match &field.kind {
            SelectionKind::Leaf => value.clone(),
            SelectionKind::Object {
                type_name: nested_type,
                selection: nested,
            } => match value {
                Value::Null => Value::Null,
                Value::Object(inner) => project_object(inner, nested, mask, nested_type)?,
                other => return Err(field_shape_error(type_name, &field.name, "object", other)),
            },
            SelectionKind::List {
                type_name: nested_type,
                selection: nested,
            } => match value {
                Value::Null => Value::Null,
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Null => Ok(Value::Null),
                            Value::Object(inner) => project_object(inner, nested, mask, nested_type),
                            other => Err(field_shape_error(type_name, &field.name, "object", other)),
                        })
                        .collect::<QueryResult<Vec<_>>>()?,
                ),
                other => return Err(field_shape_error(type_name, &field.name, "array", other)),
            },
        };

        output.insert(field.response_key().to_string(), projected);
    }

    Ok(Value::Object(output))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn shape_error(type_name: &str, expected: &str, found: &Value) -> QueryError {
    QueryError::internal(format!(
        "expected {} document for type {}, found {}",
        expected,
        type_name,
        kind_of(found)
    ))
}

fn field_shape_error(type_name: &str, field: &str, expected: &str, found: &Value) -> QueryError {
    QueryError::internal(format!(
        "expected {} at {}.{}, found {}",
        expected,
        type_name,
        field,
        kind_of(found)
    ))
}
