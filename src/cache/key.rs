//! # Cache Keys
//!
//! Content-derived keys: the operation name in clear (so invalidation can
//! target an operation by prefix) followed by a SHA-256 digest of the
//! canonical arguments and the tenant scope.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Opaque cache key, `"{operation}:{sha256 hex}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `operation` called with `arguments` in `tenant`.
    ///
    /// Object keys are sorted before hashing, so argument order in the
    /// original request never changes the key.
    pub fn derive(operation: &str, arguments: &Value, tenant: &str) -> Self {
        let canonical = canonicalize(arguments).to_string();

        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        hasher.update([0u8]);
        hasher.update(tenant.as_bytes());

        Self(format!("{}:{}", operation, hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glob matching every key of `operation`
    pub fn operation_pattern(operation: &str) -> String {
        format!("{}:*", operation)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Copy of `value` with every object's keys in sorted order
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(object.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&object[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_prefixed_by_operation() {
        let key = CacheKey::derive("users", &json!({"limit": 10}), "");
        assert!(key.as_str().starts_with("users:"));
        assert_eq!(key.as_str().len(), "users:".len() + 64);
    }

    #[test]
    fn test_argument_order_does_not_matter() {
        let a = CacheKey::derive("users", &json!({"limit": 10, "where": {"a": 1, "b": 2}}), "t1");
        let b = CacheKey::derive("users", &json!({"where": {"b": 2, "a": 1}, "limit": 10}), "t1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_tenant_and_operation_separate_keys() {
        let args = json!({"limit": 10});
        let base = CacheKey::derive("users", &args, "t1");
        assert_ne!(base, CacheKey::derive("users", &args, "t2"));
        assert_ne!(base, CacheKey::derive("posts", &args, "t1"));
    }

    #[test]
    fn test_array_order_is_significant() {
        let a = CacheKey::derive("users", &json!({"ids": [1, 2]}), "");
        let b = CacheKey::derive("users", &json!({"ids": [2, 1]}), "");
        assert_ne!(a, b);
    }
}
