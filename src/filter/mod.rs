//! # Filter Model
//!
//! Typed filter expressions and the operator set they draw from.

pub mod expr;
pub mod operator;

pub use expr::{FilterExpr, FilterValue};
pub use operator::{FilterOperator, OperatorCategory, ValueArity, ALL_OPERATORS};
