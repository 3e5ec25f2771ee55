//! # Field Bindings
//!
//! Maps the dotted field paths a caller may filter on to the storage
//! expressions that back them. Produced by the schema compiler; the clause
//! generator refuses any path that is not bound here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// Column holding the document when a table does not say otherwise
pub const DEFAULT_DOCUMENT_COLUMN: &str = "data";

/// Declared storage type of a bound field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Text,
    Integer,
    Numeric,
    Boolean,
    Timestamp,
    Date,
    Uuid,
    Inet,
    Ltree,
    Vector,
    Json,
}

impl StorageType {
    /// Extracted document values are text; anything else compares only after
    /// casting both sides to the declared type.
    pub fn needs_cast(&self) -> bool {
        !matches!(self, StorageType::Text)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Text => "text",
            StorageType::Integer => "integer",
            StorageType::Numeric => "numeric",
            StorageType::Boolean => "boolean",
            StorageType::Timestamp => "timestamp",
            StorageType::Date => "date",
            StorageType::Uuid => "uuid",
            StorageType::Inet => "inet",
            StorageType::Ltree => "ltree",
            StorageType::Vector => "vector",
            StorageType::Json => "json",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a bound field lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageAccess {
    /// A real column of the source
    Column(String),

    /// A path inside the document column
    Document(Vec<String>),

    /// A path inside each element of a document array
    ArrayElement {
        array: Vec<String>,
        element: Vec<String>,
    },
}

/// Binding of one filterable field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub access: StorageAccess,

    #[serde(default)]
    pub storage_type: StorageType,
}

impl FieldBinding {
    pub fn new(access: StorageAccess, storage_type: StorageType) -> Self {
        Self {
            access,
            storage_type,
        }
    }

    fn validate(&self, path: &str) -> QueryResult<()> {
        let segments: Vec<&String> = match &self.access {
            StorageAccess::Column(name) => vec![name],
            StorageAccess::Document(segments) => {
                if segments.is_empty() {
                    return Err(QueryError::internal(format!(
                        "binding '{}' has an empty document path",
                        path
                    )));
                }
                segments.iter().collect()
            }
            StorageAccess::ArrayElement { array, element } => {
                if array.is_empty() {
                    return Err(QueryError::internal(format!(
                        "binding '{}' has an empty array path",
                        path
                    )));
                }
                array.iter().chain(element.iter()).collect()
            }
        };

        for segment in segments {
            validate_identifier(segment)?;
        }
        Ok(())
    }
}

/// Check that a name is safe to embed in SQL text.
///
/// Bound identifiers are written into clause text (column names, JSON path
/// segments), so they are restricted to plain identifiers.
pub fn validate_identifier(name: &str) -> QueryResult<()> {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Ok(())
    } else {
        Err(QueryError::internal(format!("invalid identifier '{}'", name)))
    }
}

/// Check a possibly schema-qualified name (`public.v_user`)
pub fn validate_qualified_identifier(name: &str) -> QueryResult<()> {
    name.split('.').try_for_each(validate_identifier)
}

/// Table of filterable fields for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingTable {
    #[serde(default = "default_document_column")]
    document_column: String,

    #[serde(default)]
    fields: BTreeMap<String, FieldBinding>,
}

fn default_document_column() -> String {
    DEFAULT_DOCUMENT_COLUMN.to_string()
}

impl Default for BindingTable {
    fn default() -> Self {
        Self {
            document_column: default_document_column(),
            fields: BTreeMap::new(),
        }
    }
}

impl BindingTable {
    /// Create an empty table over the given document column
    pub fn new(document_column: impl Into<String>) -> QueryResult<Self> {
        let document_column = document_column.into();
        validate_identifier(&document_column)?;
        Ok(Self {
            document_column,
            fields: BTreeMap::new(),
        })
    }

    /// Bind a dotted path
    pub fn insert(&mut self, path: impl Into<String>, binding: FieldBinding) -> QueryResult<()> {
        let path = path.into();
        binding.validate(&path)?;
        self.fields.insert(path, binding);
        Ok(())
    }

    /// Bind a dotted path to the same path inside the document
    pub fn with_document_field(mut self, path: &str, storage_type: StorageType) -> QueryResult<Self> {
        let segments = path.split('.').map(str::to_string).collect();
        self.insert(path, FieldBinding::new(StorageAccess::Document(segments), storage_type))?;
        Ok(self)
    }

    /// Bind a dotted path to a real column
    pub fn with_column(mut self, path: &str, column: &str, storage_type: StorageType) -> QueryResult<Self> {
        self.insert(
            path,
            FieldBinding::new(StorageAccess::Column(column.to_string()), storage_type),
        )?;
        Ok(self)
    }

    /// Bind `array.element` to an existential test over a document array
    pub fn with_array_element(
        mut self,
        path: &str,
        array: &str,
        element: &str,
        storage_type: StorageType,
    ) -> QueryResult<Self> {
        let split = |s: &str| -> Vec<String> {
            s.split('.').filter(|p| !p.is_empty()).map(str::to_string).collect()
        };
        self.insert(
            path,
            FieldBinding::new(
                StorageAccess::ArrayElement {
                    array: split(array),
                    element: split(element),
                },
                storage_type,
            ),
        )?;
        Ok(self)
    }

    /// Re-check every binding (tables loaded from compiled schema files)
    pub fn validate(&self) -> QueryResult<()> {
        validate_identifier(&self.document_column)?;
        for (path, binding) in &self.fields {
            binding.validate(path)?;
        }
        Ok(())
    }

    pub fn document_column(&self) -> &str {
        &self.document_column
    }

    /// Resolve a filter path to its binding
    pub fn resolve(&self, path: &[String]) -> QueryResult<&FieldBinding> {
        let key = path.join(".");
        self.fields
            .get(&key)
            .ok_or_else(|| QueryError::validation(format!("field '{}' cannot be filtered", key)))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bound_path() {
        let table = BindingTable::default()
            .with_document_field("author.name", StorageType::Text)
            .unwrap();
        let binding = table
            .resolve(&["author".to_string(), "name".to_string()])
            .unwrap();
        assert_eq!(
            binding.access,
            StorageAccess::Document(vec!["author".into(), "name".into()])
        );
    }

    #[test]
    fn test_unbound_path_is_validation_error() {
        let table = BindingTable::default();
        let err = table.resolve(&["password".to_string()]).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_unsafe_identifier_rejected() {
        assert!(BindingTable::default()
            .with_document_field("name'; DROP TABLE users; --", StorageType::Text)
            .is_err());
        assert!(BindingTable::new("data col").is_err());
        assert!(BindingTable::default()
            .with_column("id", "1id", StorageType::Integer)
            .is_err());
    }

    #[test]
    fn test_qualified_identifier() {
        assert!(validate_qualified_identifier("public.v_user").is_ok());
        assert!(validate_qualified_identifier("public..v_user").is_err());
        assert!(validate_qualified_identifier("v_user;").is_err());
    }

    #[test]
    fn test_needs_cast() {
        assert!(!StorageType::Text.needs_cast());
        assert!(StorageType::Inet.needs_cast());
        assert!(StorageType::Integer.needs_cast());
    }

    #[test]
    fn test_deserialize_binding_table() {
        let table: BindingTable = serde_json::from_value(serde_json::json!({
            "fields": {
                "email": {"access": {"document": ["email"]}},
                "ip_address": {"access": {"document": ["ip_address"]}, "storage_type": "inet"},
                "comments.author.name": {
                    "access": {"array_element": {"array": ["comments"], "element": ["author", "name"]}}
                }
            }
        }))
        .unwrap();

        assert_eq!(table.document_column(), "data");
        assert_eq!(table.len(), 3);
        assert!(table.validate().is_ok());
        let ip = table.resolve(&["ip_address".to_string()]).unwrap();
        assert_eq!(ip.storage_type, StorageType::Inet);
    }
}
