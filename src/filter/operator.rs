//! # Filter Operators
//!
//! Closed set of operators a filter leaf may carry. Every consumer matches
//! exhaustively, so a new operator is a compile-time change everywhere.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Shape of the value an operator expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueArity {
    /// A single literal
    Scalar,
    /// A list of literals
    List,
    /// An embedding plus a distance bound
    Vector,
    /// A boolean switch (`true` applies the predicate, `false` negates it)
    Flag,
}

/// Operator family, used by dialects to route generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCategory {
    Comparison,
    Membership,
    Pattern,
    Null,
    Array,
    Vector,
    FullText,
    Network,
    Hierarchy,
}

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    // Comparison
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,

    // Membership
    In,
    Nin,

    // String patterns
    Contains,
    Icontains,
    Startswith,
    Istartswith,
    Endswith,
    Iendswith,
    Like,
    Ilike,

    // Null check
    Isnull,

    // Arrays
    ArrayContains,
    ArrayContainedBy,
    ArrayOverlaps,
    LenEq,
    LenNeq,
    LenGt,
    LenGte,
    LenLt,
    LenLte,

    // Vector distance (pgvector)
    CosineDistance,
    L2Distance,
    L1Distance,
    InnerProduct,

    // Full-text search
    Matches,
    PlainQuery,
    PhraseQuery,
    WebsearchQuery,

    // Network addresses
    IsIpv4,
    IsIpv6,
    IsPrivate,
    IsPublic,
    IsLoopback,
    InSubnet,
    ContainsSubnet,
    ContainsIp,

    // Hierarchy (ltree)
    AncestorOf,
    DescendantOf,
    MatchesLquery,
}

/// Every operator, in declaration order
pub const ALL_OPERATORS: &[FilterOperator] = &[
    FilterOperator::Eq,
    FilterOperator::Neq,
    FilterOperator::Gt,
    FilterOperator::Gte,
    FilterOperator::Lt,
    FilterOperator::Lte,
    FilterOperator::In,
    FilterOperator::Nin,
    FilterOperator::Contains,
    FilterOperator::Icontains,
    FilterOperator::Startswith,
    FilterOperator::Istartswith,
    FilterOperator::Endswith,
    FilterOperator::Iendswith,
    FilterOperator::Like,
    FilterOperator::Ilike,
    FilterOperator::Isnull,
    FilterOperator::ArrayContains,
    FilterOperator::ArrayContainedBy,
    FilterOperator::ArrayOverlaps,
    FilterOperator::LenEq,
    FilterOperator::LenNeq,
    FilterOperator::LenGt,
    FilterOperator::LenGte,
    FilterOperator::LenLt,
    FilterOperator::LenLte,
    FilterOperator::CosineDistance,
    FilterOperator::L2Distance,
    FilterOperator::L1Distance,
    FilterOperator::InnerProduct,
    FilterOperator::Matches,
    FilterOperator::PlainQuery,
    FilterOperator::PhraseQuery,
    FilterOperator::WebsearchQuery,
    FilterOperator::IsIpv4,
    FilterOperator::IsIpv6,
    FilterOperator::IsPrivate,
    FilterOperator::IsPublic,
    FilterOperator::IsLoopback,
    FilterOperator::InSubnet,
    FilterOperator::ContainsSubnet,
    FilterOperator::ContainsIp,
    FilterOperator::AncestorOf,
    FilterOperator::DescendantOf,
    FilterOperator::MatchesLquery,
];

impl FilterOperator {
    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Contains => "contains",
            Self::Icontains => "icontains",
            Self::Startswith => "startswith",
            Self::Istartswith => "istartswith",
            Self::Endswith => "endswith",
            Self::Iendswith => "iendswith",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::Isnull => "isnull",
            Self::ArrayContains => "array_contains",
            Self::ArrayContainedBy => "array_contained_by",
            Self::ArrayOverlaps => "array_overlaps",
            Self::LenEq => "len_eq",
            Self::LenNeq => "len_neq",
            Self::LenGt => "len_gt",
            Self::LenGte => "len_gte",
            Self::LenLt => "len_lt",
            Self::LenLte => "len_lte",
            Self::CosineDistance => "cosine_distance",
            Self::L2Distance => "l2_distance",
            Self::L1Distance => "l1_distance",
            Self::InnerProduct => "inner_product",
            Self::Matches => "matches",
            Self::PlainQuery => "plain_query",
            Self::PhraseQuery => "phrase_query",
            Self::WebsearchQuery => "websearch_query",
            Self::IsIpv4 => "is_ipv4",
            Self::IsIpv6 => "is_ipv6",
            Self::IsPrivate => "is_private",
            Self::IsPublic => "is_public",
            Self::IsLoopback => "is_loopback",
            Self::InSubnet => "in_subnet",
            Self::ContainsSubnet => "contains_subnet",
            Self::ContainsIp => "contains_ip",
            Self::AncestorOf => "ancestor_of",
            Self::DescendantOf => "descendant_of",
            Self::MatchesLquery => "matches_lquery",
        }
    }

    /// Operator family
    pub fn category(&self) -> OperatorCategory {
        match self {
            Self::Eq | Self::Neq | Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                OperatorCategory::Comparison
            }
            Self::In | Self::Nin => OperatorCategory::Membership,
            Self::Contains
            | Self::Icontains
            | Self::Startswith
            | Self::Istartswith
            | Self::Endswith
            | Self::Iendswith
            | Self::Like
            | Self::Ilike => OperatorCategory::Pattern,
            Self::Isnull => OperatorCategory::Null,
            Self::ArrayContains
            | Self::ArrayContainedBy
            | Self::ArrayOverlaps
            | Self::LenEq
            | Self::LenNeq
            | Self::LenGt
            | Self::LenGte
            | Self::LenLt
            | Self::LenLte => OperatorCategory::Array,
            Self::CosineDistance | Self::L2Distance | Self::L1Distance | Self::InnerProduct => {
                OperatorCategory::Vector
            }
            Self::Matches | Self::PlainQuery | Self::PhraseQuery | Self::WebsearchQuery => {
                OperatorCategory::FullText
            }
            Self::IsIpv4
            | Self::IsIpv6
            | Self::IsPrivate
            | Self::IsPublic
            | Self::IsLoopback
            | Self::InSubnet
            | Self::ContainsSubnet
            | Self::ContainsIp => OperatorCategory::Network,
            Self::AncestorOf | Self::DescendantOf | Self::MatchesLquery => {
                OperatorCategory::Hierarchy
            }
        }
    }

    /// Expected value shape
    pub fn arity(&self) -> ValueArity {
        match self {
            Self::In | Self::Nin => ValueArity::List,
            // Containment compares against a JSON array literal, bound as one parameter
            Self::ArrayContains | Self::ArrayContainedBy | Self::ArrayOverlaps => ValueArity::List,
            Self::CosineDistance | Self::L2Distance | Self::L1Distance | Self::InnerProduct => {
                ValueArity::Vector
            }
            Self::Isnull
            | Self::IsIpv4
            | Self::IsIpv6
            | Self::IsPrivate
            | Self::IsPublic
            | Self::IsLoopback => ValueArity::Flag,
            _ => ValueArity::Scalar,
        }
    }

    /// Whether pattern matching ignores case
    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            Self::Icontains | Self::Istartswith | Self::Iendswith | Self::Ilike
        )
    }

    /// Whether the operator requires a string literal
    pub fn requires_string(&self) -> bool {
        matches!(
            self.category(),
            OperatorCategory::Pattern | OperatorCategory::FullText | OperatorCategory::Hierarchy
        ) || matches!(
            self,
            Self::InSubnet | Self::ContainsSubnet | Self::ContainsIp
        )
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = QueryError;

    /// Unknown names are rejected, never guessed
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_OPERATORS
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::validation(format!("unknown operator '{}'", s)))
    }
}
