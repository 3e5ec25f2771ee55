//! # Authorization
//!
//! Caller identity and per-field visibility.

pub mod identity;
pub mod mask;

pub use identity::CallerIdentity;
pub use mask::{AuthorizationMask, FieldRule, FieldRuleTable};
