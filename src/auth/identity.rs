//! # Caller Identity
//!
//! Resolved identity carried with each request. Token validation happens
//! upstream; the query core only consumes the outcome.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and grants of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// The authenticated user's ID (None if anonymous)
    #[serde(default)]
    pub user_id: Option<Uuid>,

    /// Tenant the request is scoped to
    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub roles: BTreeSet<String>,

    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Whether using service role (bypasses field rules)
    #[serde(default)]
    pub is_service_role: bool,
}

impl CallerIdentity {
    /// Create identity for anonymous access
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create identity for an authenticated user
    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Create identity for the service role
    pub fn service_role() -> Self {
        Self {
            is_service_role: true,
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() || self.is_service_role
    }

    /// Whether the caller holds at least one of `roles`
    pub fn has_any_role(&self, roles: &BTreeSet<String>) -> bool {
        !self.roles.is_disjoint(roles)
    }

    /// Whether the caller holds at least one of `permissions`
    pub fn has_any_permission(&self, permissions: &BTreeSet<String>) -> bool {
        !self.permissions.is_disjoint(permissions)
    }

    /// Tenant component of cache keys; unscoped requests share `""`
    pub fn tenant_scope(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = CallerIdentity::anonymous();
        assert!(!identity.is_authenticated());
        assert!(!identity.is_service_role);
        assert_eq!(identity.tenant_scope(), "");
    }

    #[test]
    fn test_builder_methods() {
        let identity = CallerIdentity::authenticated(Uuid::new_v4())
            .with_roles(["editor"])
            .with_permissions(["read:email"])
            .with_tenant("acme");

        assert!(identity.is_authenticated());
        assert_eq!(identity.tenant_scope(), "acme");

        let wanted: BTreeSet<String> = ["admin", "editor"].iter().map(|s| s.to_string()).collect();
        assert!(identity.has_any_role(&wanted));
        assert!(!identity.has_any_permission(&BTreeSet::new()));
    }

    #[test]
    fn test_deserialize_partial_identity() {
        let identity: CallerIdentity =
            serde_json::from_value(serde_json::json!({"roles": ["admin"]})).unwrap();
        assert!(identity.roles.contains("admin"));
        assert!(identity.user_id.is_none());
    }
}
