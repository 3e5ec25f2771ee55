//! # Operations and the Operation Registry
//!
//! An operation is a named, read-only entry point produced by the schema
//! compiler: which view backs it, which document type it returns, which
//! fields may be filtered and how they are stored.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::FieldRuleTable;
use crate::config::ConfigError;
use crate::db::{OrderBy, SelectQuery};
use crate::error::{QueryError, QueryResult};
use crate::sql::binding::{validate_identifier, validate_qualified_identifier};
use crate::sql::{BindingTable, SqlClause};

/// One compiled operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDef {
    /// Operation name, also the cache-key prefix
    pub name: String,

    /// View or table holding one document per row
    pub source: String,

    /// Document type, used for field rules
    pub type_name: String,

    /// `false` for single-row lookups
    #[serde(default = "default_returns_list")]
    pub returns_list: bool,

    #[serde(default)]
    pub bindings: BindingTable,

    #[serde(default)]
    pub default_order: Vec<OrderBy>,

    /// Overrides the cache default TTL
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

fn default_returns_list() -> bool {
    true
}

impl OperationDef {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        type_name: impl Into<String>,
        bindings: BindingTable,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            type_name: type_name.into(),
            returns_list: true,
            bindings,
            default_order: Vec::new(),
            cache_ttl_secs: None,
        }
    }

    pub fn single_row(mut self) -> Self {
        self.returns_list = false;
        self
    }

    pub fn with_order(mut self, order: Vec<OrderBy>) -> Self {
        self.default_order = order;
        self
    }

    pub fn with_cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = Some(secs);
        self
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Check everything that ends up in SQL text
    pub fn validate(&self) -> QueryResult<()> {
        validate_identifier(&self.name)
            .map_err(|_| QueryError::internal(format!("invalid operation name '{}'", self.name)))?;
        validate_qualified_identifier(&self.source)?;
        self.bindings.validate()?;
        for order in &self.default_order {
            validate_identifier(&order.column)?;
        }
        Ok(())
    }

    /// Retrieval query for this operation
    pub fn select(&self, clause: Option<SqlClause>, limit: u64, offset: Option<u64>) -> SelectQuery {
        let mut query = SelectQuery::new(&self.source)
            .document_column(self.bindings.document_column())
            .order_by(self.default_order.clone())
            .limit(limit);
        if let Some(clause) = clause {
            query = query.filter(clause);
        }
        if let Some(offset) = offset {
            query = query.offset(offset);
        }
        query
    }
}

/// Output of the schema compiler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledSchema {
    #[serde(default)]
    pub operations: Vec<OperationDef>,

    #[serde(default)]
    pub field_rules: FieldRuleTable,
}

impl CompiledSchema {
    /// Load a compiled schema JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: CompiledSchema = serde_json::from_str(&content)?;
        for operation in &schema.operations {
            operation
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("operation '{}': {}", operation.name, e)))?;
        }
        Ok(schema)
    }
}

#[derive(Default)]
struct RegistryState {
    operations: HashMap<String, Arc<OperationDef>>,
    field_rules: Arc<FieldRuleTable>,
    /// Bumped on every change; part of every cache key
    generation: u64,
}

/// An operation together with the rules and schema generation it was
/// resolved under
#[derive(Debug, Clone)]
pub struct ResolvedOperation {
    pub operation: Arc<OperationDef>,
    pub field_rules: Arc<FieldRuleTable>,
    pub generation: u64,
}

/// Registered operations and the field rules that apply to them
#[derive(Default)]
pub struct OperationRegistry {
    state: RwLock<RegistryState>,
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        let mut names: Vec<&String> = state.operations.keys().collect();
        names.sort();
        f.debug_struct("OperationRegistry")
            .field("operations", &names)
            .field("field_rules", &state.field_rules.len())
            .field("generation", &state.generation)
            .finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(schema: CompiledSchema) -> QueryResult<Self> {
        let registry = Self::new();
        registry.reload(schema)?;
        Ok(registry)
    }

    /// Register (or replace) one operation
    pub fn register(&self, operation: OperationDef) -> QueryResult<()> {
        operation.validate()?;
        let mut state = self.state.write();
        state
            .operations
            .insert(operation.name.clone(), Arc::new(operation));
        state.generation += 1;
        Ok(())
    }

    /// Look up an operation by name
    pub fn get(&self, name: &str) -> QueryResult<Arc<OperationDef>> {
        self.resolve(name).map(|resolved| resolved.operation)
    }

    /// Look up an operation, its field rules and the current generation in
    /// one consistent read
    pub fn resolve(&self, name: &str) -> QueryResult<ResolvedOperation> {
        let state = self.state.read();
        let operation = state
            .operations
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::validation(format!("unknown operation '{}'", name)))?;
        Ok(ResolvedOperation {
            operation,
            field_rules: Arc::clone(&state.field_rules),
            generation: state.generation,
        })
    }

    pub fn field_rules(&self) -> Arc<FieldRuleTable> {
        Arc::clone(&self.state.read().field_rules)
    }

    pub fn set_field_rules(&self, rules: FieldRuleTable) {
        let mut state = self.state.write();
        state.field_rules = Arc::new(rules);
        state.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Sorted operation names
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().operations.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted names of the operations reading from `source`
    pub fn operations_on(&self, source: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .read()
            .operations
            .values()
            .filter(|operation| operation.source == source)
            .map(|operation| operation.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Replace everything with a freshly compiled schema.
    ///
    /// The schema is validated in full first; on error the registry is
    /// left untouched.
    pub fn reload(&self, schema: CompiledSchema) -> QueryResult<usize> {
        let mut operations = HashMap::with_capacity(schema.operations.len());
        for operation in schema.operations {
            operation.validate()?;
            operations.insert(operation.name.clone(), Arc::new(operation));
        }

        let mut state = self.state.write();
        state.operations = operations;
        state.field_rules = Arc::new(schema.field_rules);
        state.generation += 1;
        Ok(state.operations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FieldRule;
    use crate::sql::StorageType;
    use std::io::Write;

    fn users() -> OperationDef {
        OperationDef::new(
            "users",
            "public.v_user",
            "User",
            BindingTable::default()
                .with_document_field("email", StorageType::Text)
                .unwrap(),
        )
    }

    #[test]
    fn test_register_and_get() {
        let registry = OperationRegistry::new();
        registry.register(users()).unwrap();

        assert_eq!(registry.get("users").unwrap().type_name, "User");
        assert!(matches!(
            registry.get("posts").unwrap_err(),
            QueryError::Validation(_)
        ));
        assert_eq!(registry.operations(), vec!["users"]);
    }

    #[test]
    fn test_unsafe_source_rejected() {
        let mut op = users();
        op.source = "v_user; DROP TABLE x".to_string();
        assert!(OperationRegistry::new().register(op).is_err());
    }

    #[test]
    fn test_reload_is_all_or_nothing() {
        let registry = OperationRegistry::new();
        registry.register(users()).unwrap();

        let mut bad = users();
        bad.name = "bad name".to_string();
        let schema = CompiledSchema {
            operations: vec![OperationDef::new("posts", "v_post", "Post", BindingTable::default()), bad],
            field_rules: FieldRuleTable::new(),
        };

        assert!(registry.reload(schema).is_err());
        assert_eq!(registry.operations(), vec!["users"]);
    }

    #[test]
    fn test_reload_replaces_rules() {
        let registry = OperationRegistry::new();
        let schema = CompiledSchema {
            operations: vec![users()],
            field_rules: FieldRuleTable::new().with_rule("User", "email", FieldRule::roles(["admin"])),
        };
        assert_eq!(registry.reload(schema).unwrap(), 1);
        assert!(registry.field_rules().rule("User", "email").is_some());
    }

    #[test]
    fn test_select_uses_operation_defaults() {
        let op = users().with_order(vec![OrderBy::asc("id")]);
        let query = op.select(None, 25, Some(50));
        assert_eq!(query.source, "public.v_user");
        assert_eq!(query.document_column, "data");
        assert_eq!(query.order_by, vec![OrderBy::asc("id")]);
        assert_eq!(query.limit, Some(25));
        assert_eq!(query.offset, Some(50));
    }

    #[test]
    fn test_schema_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "operations": [{
                    "name": "user_by_id",
                    "source": "v_user",
                    "type_name": "User",
                    "returns_list": false,
                    "bindings": {"fields": {"id": {"access": {"column": "id"}, "storage_type": "uuid"}}},
                    "cache_ttl_secs": 30
                }],
                "field_rules": {"User": {"email": {"required_roles": ["admin"]}}}
            }"#,
        )
        .unwrap();

        let schema = CompiledSchema::from_file(file.path()).unwrap();
        let registry = OperationRegistry::from_schema(schema).unwrap();
        let op = registry.get("user_by_id").unwrap();
        assert!(!op.returns_list);
        assert_eq!(op.cache_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(op.bindings.len(), 1);
    }

    #[test]
    fn test_every_change_bumps_generation() {
        let registry = OperationRegistry::new();
        let start = registry.generation();

        registry.register(users()).unwrap();
        let registered = registry.generation();
        assert!(registered > start);

        registry.set_field_rules(FieldRuleTable::new());
        assert!(registry.generation() > registered);

        let before_reload = registry.generation();
        registry
            .reload(CompiledSchema {
                operations: vec![users()],
                field_rules: FieldRuleTable::new(),
            })
            .unwrap();
        assert!(registry.generation() > before_reload);
    }

    #[test]
    fn test_failed_reload_keeps_generation() {
        let registry = OperationRegistry::new();
        registry.register(users()).unwrap();
        let generation = registry.generation();

        let mut bad = users();
        bad.source = "v_user;".to_string();
        let schema = CompiledSchema {
            operations: vec![bad],
            field_rules: FieldRuleTable::new(),
        };
        assert!(registry.reload(schema).is_err());
        assert_eq!(registry.generation(), generation);
    }

    #[test]
    fn test_resolve_is_consistent() {
        let registry = OperationRegistry::new();
        registry.register(users()).unwrap();
        registry.set_field_rules(FieldRuleTable::new().with_rule("User", "email", FieldRule::roles(["admin"])));

        let resolved = registry.resolve("users").unwrap();
        assert_eq!(resolved.operation.source, "public.v_user");
        assert!(resolved.field_rules.rule("User", "email").is_some());
        assert_eq!(resolved.generation, registry.generation());
        assert!(matches!(registry.resolve("orders"), Err(QueryError::Validation(_))));
    }

    #[test]
    fn test_operations_on_source() {
        let registry = OperationRegistry::new();
        registry.register(users()).unwrap();
        registry
            .register(OperationDef::new("user_by_id", "public.v_user", "User", BindingTable::default()).single_row())
            .unwrap();
        registry
            .register(OperationDef::new("posts", "v_post", "Post", BindingTable::default()))
            .unwrap();

        assert_eq!(registry.operations_on("public.v_user"), vec!["user_by_id", "users"]);
        assert!(registry.operations_on("v_comment").is_empty());
    }

    #[test]
    fn test_debug_lists_operations() {
        let registry = OperationRegistry::new();
        registry.register(users()).unwrap();
        let printed = format!("{:?}", registry);
        assert!(printed.contains("users"));
        assert!(printed.contains("generation"));
    }
}
