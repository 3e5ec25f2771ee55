//! # Authorization Mask
//!
//! Per-request field visibility, resolved once from static field rules and
//! the caller's identity.
//!
//! ## Invariants
//! - Fields without a rule are visible. This is default-allow: a newly added
//!   sensitive field is exposed until a rule is declared for it.
//! - A rule admits the caller if any required role **or** any required
//!   permission matches. A rule with neither set admits nobody.
//! - Only the service role bypasses rules, and it does so explicitly.
//! - Denied fields are omitted from responses, never reported as errors.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::identity::CallerIdentity;

/// Access requirement for one field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub required_roles: BTreeSet<String>,

    #[serde(default)]
    pub required_permissions: BTreeSet<String>,
}

impl FieldRule {
    /// Rule satisfied by any of `roles`
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_roles: roles.into_iter().map(Into::into).collect(),
            required_permissions: BTreeSet::new(),
        }
    }

    /// Also accept any of `permissions`
    pub fn or_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Whether `identity` satisfies this rule
    pub fn admits(&self, identity: &CallerIdentity) -> bool {
        identity.has_any_role(&self.required_roles)
            || identity.has_any_permission(&self.required_permissions)
    }
}

/// Static field rules from the compiled schema, keyed by type then field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldRuleTable {
    rules: BTreeMap<String, BTreeMap<String, FieldRule>>,
}

impl FieldRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a rule for `type_name.field_name`
    pub fn add_rule(&mut self, type_name: impl Into<String>, field_name: impl Into<String>, rule: FieldRule) {
        self.rules
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), rule);
    }

    pub fn with_rule(mut self, type_name: &str, field_name: &str, rule: FieldRule) -> Self {
        self.add_rule(type_name, field_name, rule);
        self
    }

    pub fn rule(&self, type_name: &str, field_name: &str) -> Option<&FieldRule> {
        self.rules.get(type_name)?.get(field_name)
    }

    /// All `(type, field, rule)` triples
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &FieldRule)> {
        self.rules.iter().flat_map(|(type_name, fields)| {
            fields
                .iter()
                .map(move |(field, rule)| (type_name.as_str(), field.as_str(), rule))
        })
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolved visibility for one caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationMask {
    /// Denied fields per type
    denied: BTreeMap<String, BTreeSet<String>>,
}

impl AuthorizationMask {
    /// Resolve every rule against `identity`
    pub fn build(rules: &FieldRuleTable, identity: &CallerIdentity) -> Self {
        if identity.is_service_role {
            return Self::allow_all();
        }

        let mut denied: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (type_name, field, rule) in rules.iter() {
            if !rule.admits(identity) {
                denied
                    .entry(type_name.to_string())
                    .or_default()
                    .insert(field.to_string());
            }
        }

        Self { denied }
    }

    /// Mask that denies nothing
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether the caller may see `type_name.field_name`
    pub fn is_allowed(&self, type_name: &str, field_name: &str) -> bool {
        self.denied
            .get(type_name)
            .map_or(true, |fields| !fields.contains(field_name))
    }

    pub fn denied_count(&self) -> usize {
        self.denied.values().map(BTreeSet::len).sum()
    }

    /// Stable description of the denied set, part of cache keys
    pub fn fingerprint(&self) -> String {
        self.denied
            .iter()
            .flat_map(|(t, fields)| fields.iter().map(move |f| format!("{}.{}", t, f)))
            .collect::<Vec<_>>()
            .join(",")
    }
}
