//! Query requests as handed over by the request parser.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::AuthorizationMask;
use crate::cache::CacheKey;
use crate::error::QueryResult;
use crate::filter::FilterExpr;
use crate::selection::SelectionSet;

/// One read request against a registered operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub operation: String,

    #[serde(default)]
    pub filter: Option<FilterExpr>,

    #[serde(default)]
    pub selection: SelectionSet,

    #[serde(default)]
    pub limit: Option<u64>,

    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryRequest {
    pub fn new(operation: impl Into<String>, selection: SelectionSet) -> Self {
        Self {
            operation: operation.into(),
            filter: None,
            selection,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Cache key for this request as seen through `mask`.
    ///
    /// Covers everything that shapes the response: filter, selection,
    /// effective limit, offset, the caller's denied fields and the schema
    /// generation the operation was resolved under.
    pub fn cache_key(
        &self,
        limit: u64,
        generation: u64,
        mask: &AuthorizationMask,
        tenant: &str,
    ) -> QueryResult<CacheKey> {
        let arguments = json!({
            "schema": generation,
            "filter": serde_json::to_value(&self.filter)?,
            "selection": self.selection.fingerprint(),
            "limit": limit,
            "offset": self.offset,
            "denied": mask.fingerprint(),
        });
        Ok(CacheKey::derive(&self.operation, &arguments, tenant))
    }
}
