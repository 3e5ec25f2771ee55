//! Request lifecycle states.
//!
//! ```text
//! Received -> ClauseBuilt -> CacheChecked -> CacheHit -> Done
//!                                         -> CacheMiss -> Executed -> Projected -> CachePopulated -> Done
//! ```
//!
//! Any non-terminal state may move to `Failed`, except that a cache hit
//! always completes. Nothing moves backwards.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    ClauseBuilt,
    CacheChecked,
    CacheHit,
    CacheMiss,
    Executed,
    Projected,
    CachePopulated,
    Done,
    Failed,
}

impl RequestState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;

        match (self, next) {
            (Received, ClauseBuilt)
            | (ClauseBuilt, CacheChecked)
            | (CacheChecked, CacheHit)
            | (CacheChecked, CacheMiss)
            | (CacheHit, Done)
            | (CacheMiss, Executed)
            | (Executed, Projected)
            | (Projected, CachePopulated)
            | (CachePopulated, Done) => true,
            (Received | ClauseBuilt | CacheChecked | CacheMiss | Executed | Projected, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Done | RequestState::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// States visited by one request
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionTrace {
    pub request_id: Uuid,
    pub operation: String,
    pub states: Vec<RequestState>,

    /// Rows returned by the adapter, when execution happened
    pub rows_fetched: Option<usize>,

    pub cache_key: Option<String>,

    #[serde(skip)]
    started: Instant,
}

impl ExecutionTrace {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            operation: operation.into(),
            states: vec![RequestState::Received],
            rows_fetched: None,
            cache_key: None,
            started: Instant::now(),
        }
    }

    pub fn current(&self) -> RequestState {
        self.states
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }

    /// Record a transition, rejecting anything out of order
    pub fn advance(&mut self, next: RequestState) -> QueryResult<()> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(QueryError::internal(format!(
                "illegal request transition {} -> {}",
                current, next
            )));
        }
        debug!(from = %current, to = %next, "request state");
        self.states.push(next);
        Ok(())
    }

    /// Move to `Failed` if the request has not already finished
    pub fn fail(&mut self) {
        if self.current().can_advance_to(RequestState::Failed) {
            self.states.push(RequestState::Failed);
        }
    }

    pub fn was_cache_hit(&self) -> bool {
        self.states.contains(&RequestState::CacheHit)
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}
