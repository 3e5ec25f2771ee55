//! # SQL Clause Generation
//!
//! Turns filter expressions into parameterized WHERE fragments for each
//! supported backend.

pub mod binding;
pub mod dialect;
pub mod generator;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use binding::{BindingTable, FieldBinding, StorageAccess, StorageType};
pub use dialect::{DialectKind, SqlDialect};
pub use generator::{SqlClause, WhereGenerator};
