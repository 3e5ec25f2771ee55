//! # Selection Sets
//!
//! The fields a caller asked for, with optional output aliases and nested
//! sub-selections. Built by the request parser; read-only during projection.

use serde::{Deserialize, Serialize};

/// How a selected field is shaped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Copied verbatim
    #[default]
    Leaf,

    /// Nested object projected against `selection`
    Object {
        type_name: String,
        selection: SelectionSet,
    },

    /// Array whose elements are each projected against `selection`
    List {
        type_name: String,
        selection: SelectionSet,
    },
}

/// One selected field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default)]
    pub kind: SelectionKind,
}

impl FieldSelection {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind: SelectionKind::Leaf,
        }
    }

    pub fn object(name: impl Into<String>, type_name: impl Into<String>, selection: SelectionSet) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind: SelectionKind::Object {
                type_name: type_name.into(),
                selection,
            },
        }
    }

    pub fn list(name: impl Into<String>, type_name: impl Into<String>, selection: SelectionSet) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind: SelectionKind::List {
                type_name: type_name.into(),
                selection,
            },
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Key this field is written under in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn fingerprint_into(&self, out: &mut String) {
        out.push_str(&self.name);
        if let Some(alias) = &self.alias {
            out.push('>');
            out.push_str(alias);
        }
        match &self.kind {
            SelectionKind::Leaf => {}
            SelectionKind::Object {
                type_name,
                selection,
            } => {
                out.push(':');
                out.push_str(type_name);
                out.push('{');
                selection.fingerprint_into(out);
                out.push('}');
            }
            SelectionKind::List {
                type_name,
                selection,
            } => {
                out.push(':');
                out.push_str(type_name);
                out.push('[');
                selection.fingerprint_into(out);
                out.push(']');
            }
        }
    }
}

/// Ordered selection with at most one field per response key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FieldSelection>", into = "Vec<FieldSelection>")]
pub struct SelectionSet {
    fields: Vec<FieldSelection>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A field whose response key is already present collapses
    /// into the existing one; nested selections of the same shape merge.
    pub fn push(&mut self, field: FieldSelection) {
        let existing = self
            .fields
            .iter_mut()
            .find(|f| f.response_key() == field.response_key());

        match existing {
            None => self.fields.push(field),
            Some(existing) => {
                if existing.name != field.name {
                    return;
                }
                match (&mut existing.kind, field.kind) {
                    (
                        SelectionKind::Object { selection: ours, .. },
                        SelectionKind::Object { selection: theirs, .. },
                    )
                    | (
                        SelectionKind::List { selection: ours, .. },
                        SelectionKind::List { selection: theirs, .. },
                    ) => {
                        for child in theirs.fields {
                            ours.push(child);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    pub fn with(mut self, field: FieldSelection) -> Self {
        self.push(field);
        self
    }

    pub fn with_leaf(self, name: &str) -> Self {
        self.with(FieldSelection::leaf(name))
    }

    /// Selection of plain leaves
    pub fn leaves<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.push(FieldSelection::leaf(name));
        }
        set
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSelection> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical text form, part of cache keys
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        self.fingerprint_into(&mut out);
        out
    }

    fn fingerprint_into(&self, out: &mut String) {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            field.fingerprint_into(out);
        }
    }
}

impl From<Vec<FieldSelection>> for SelectionSet {
    fn from(fields: Vec<FieldSelection>) -> Self {
        let mut set = Self::new();
        for field in fields {
            set.push(field);
        }
        set
    }
}

impl From<SelectionSet> for Vec<FieldSelection> {
    fn from(set: SelectionSet) -> Self {
        set.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicates_collapse() {
        let set = SelectionSet::new()
            .with_leaf("id")
            .with_leaf("name")
            .with_leaf("id");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_alias_distinguishes_fields() {
        let set = SelectionSet::new()
            .with_leaf("name")
            .with(FieldSelection::leaf("name").with_alias("displayName"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_nested_duplicates_merge_children() {
        let set = SelectionSet::new()
            .with(FieldSelection::object(
                "author",
                "User",
                SelectionSet::leaves(["name"]),
            ))
            .with(FieldSelection::object(
                "author",
                "User",
                SelectionSet::leaves(["email", "name"]),
            ));

        assert_eq!(set.len(), 1);
        assert_eq!(set.fingerprint(), "author:User{name,email}");
    }

    #[test]
    fn test_fingerprint_reflects_alias_and_shape() {
        let plain = SelectionSet::leaves(["id", "name"]);
        let aliased = SelectionSet::new()
            .with_leaf("id")
            .with(FieldSelection::leaf("name").with_alias("n"));
        assert_eq!(plain.fingerprint(), "id,name");
        assert_eq!(aliased.fingerprint(), "id,name>n");
    }

    #[test]
    fn test_deserialize_collapses_duplicates() {
        let set: SelectionSet = serde_json::from_value(json!([
            {"name": "id"},
            {"name": "comments", "kind": {"list": {"type_name": "Comment", "selection": [
                {"name": "author", "kind": {"object": {"type_name": "User", "selection": [{"name": "name"}]}}}
            ]}}},
            {"name": "id"}
        ]))
        .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.fingerprint(), "id,comments:Comment[author:User{name}]");
    }
}
