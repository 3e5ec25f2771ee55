//! Query executor
//!
//! Runs one request through its lifecycle, in strict order:
//! 1. Resolve the operation and build the WHERE clause
//! 2. Resolve the caller's authorization mask and derive the cache key
//! 3. Return a live cache entry if there is one
//! 4. Execute through the adapter, retrying transient failures
//! 5. Project every row
//! 6. Populate the cache with the projected response
//!
//! A failure at any step ends the request; nothing is cached unless step 5
//! completed.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::auth::{AuthorizationMask, CallerIdentity};
use crate::cache::{CacheKey, ResultCache};
use crate::config::{QueryConfig, QueryLimits};
use crate::db::{DatabaseAdapter, RenderedQuery, RetryPolicy, SelectQuery};
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterExpr;
use crate::projection::project_rows;
use crate::selection::SelectionSet;
use crate::sql::{SqlDialect, WhereGenerator};

use super::operation::{CompiledSchema, OperationDef, OperationRegistry};
use super::request::QueryRequest;
use super::state::{ExecutionTrace, RequestState};

/// Orchestrates clause generation, caching, execution and projection
pub struct QueryExecutor {
    adapter: Arc<dyn DatabaseAdapter>,
    registry: Arc<OperationRegistry>,
    cache: Arc<ResultCache>,
    retry: RetryPolicy,
    limits: QueryLimits,
}

impl QueryExecutor {
    /// Creates an executor with default retry policy and limits
    pub fn new(
        adapter: Arc<dyn DatabaseAdapter>,
        registry: Arc<OperationRegistry>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            adapter,
            registry,
            cache,
            retry: RetryPolicy::default(),
            limits: QueryLimits::default(),
        }
    }

    /// Creates an executor whose cache, retry policy and limits come from `config`
    pub fn from_config(
        config: &QueryConfig,
        adapter: Arc<dyn DatabaseAdapter>,
        registry: Arc<OperationRegistry>,
    ) -> Self {
        Self::new(adapter, registry, Arc::new(config.cache.build()))
            .with_retry(config.retry.policy())
            .with_limits(config.query)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Execute `operation_id` with an optional filter and a selection
    pub async fn execute_operation(
        &self,
        operation_id: &str,
        filter: Option<FilterExpr>,
        selection: SelectionSet,
        identity: &CallerIdentity,
    ) -> QueryResult<Value> {
        let mut request = QueryRequest::new(operation_id, selection);
        request.filter = filter;
        self.execute(&request, identity).await
    }

    /// Execute a request and return the response document
    pub async fn execute(&self, request: &QueryRequest, identity: &CallerIdentity) -> QueryResult<Value> {
        self.execute_traced(request, identity).await.0
    }

    /// Execute a request and also return the states it went through
    pub async fn execute_traced(
        &self,
        request: &QueryRequest,
        identity: &CallerIdentity,
    ) -> (QueryResult<Value>, ExecutionTrace) {
        let mut trace = ExecutionTrace::new(&request.operation);
        let span = info_span!(
            "query",
            operation = %request.operation,
            request_id = %trace.request_id
        );

        let result = async {
            let result = self.run(request, identity, &mut trace).await;
            if let Err(err) = &result {
                log_failure(err);
                trace.fail();
            } else {
                debug!(
                    elapsed_ms = trace.elapsed_ms() as u64,
                    cache_hit = trace.was_cache_hit(),
                    "request complete"
                );
            }
            result
        }
        .instrument(span)
        .await;

        (result, trace)
    }

    /// Render the statement a request would run, without running it
    pub fn explain(&self, request: &QueryRequest) -> QueryResult<RenderedQuery> {
        explain(&self.registry, self.limits, self.adapter.dialect(), request)
    }

    /// Drop every cached response of `operation`
    pub fn invalidate_operation(&self, operation: &str) -> QueryResult<usize> {
        self.invalidate_pattern(&CacheKey::operation_pattern(operation))
    }

    /// Drop every cached response whose key matches `pattern`
    pub fn invalidate_pattern(&self, pattern: &str) -> QueryResult<usize> {
        let removed = self.cache.delete_matching(pattern)?;
        debug!(pattern, removed, "cache invalidated");
        Ok(removed)
    }

    /// Drop every cached response of every operation reading `source`.
    ///
    /// Call after writes to a view; cache keys carry operation names, not
    /// sources, so the registry maps one to the other.
    pub fn invalidate_source(&self, source: &str) -> QueryResult<usize> {
        let mut removed = 0;
        for operation in self.registry.operations_on(source) {
            removed += self.invalidate_operation(&operation)?;
        }
        debug!(source, removed, "source invalidated");
        Ok(removed)
    }

    /// Swap in a new compiled schema and drop every cached response.
    ///
    /// Keys already carry the schema generation, so clearing only frees
    /// entries that could never be hit again.
    pub fn reload_schema(&self, schema: CompiledSchema) -> QueryResult<usize> {
        let count = self.registry.reload(schema)?;
        self.cache.clear();
        debug!(operations = count, generation = self.registry.generation(), "schema reloaded");
        Ok(count)
    }

    pub async fn health_check(&self) -> QueryResult<()> {
        self.adapter.health_check().await
    }

    async fn run(
        &self,
        request: &QueryRequest,
        identity: &CallerIdentity,
        trace: &mut ExecutionTrace,
    ) -> QueryResult<Value> {
        // One snapshot: operation, rules and generation must agree
        let resolved = self.registry.resolve(&request.operation)?;
        let operation = resolved.operation;
        let query = build_query(request, &operation, self.limits, self.adapter.dialect())?;
        trace.advance(RequestState::ClauseBuilt)?;

        let mask = AuthorizationMask::build(&resolved.field_rules, identity);
        let limit = query.limit.unwrap_or_default();
        let key = request.cache_key(limit, resolved.generation, &mask, identity.tenant_scope())?;
        trace.cache_key = Some(key.to_string());

        let cached = self.cache.get(key.as_str());
        trace.advance(RequestState::CacheChecked)?;
        if let Some(response) = cached {
            debug!("cache hit");
            trace.advance(RequestState::CacheHit)?;
            trace.advance(RequestState::Done)?;
            return Ok(Value::clone(&response));
        }
        debug!("cache miss");
        trace.advance(RequestState::CacheMiss)?;

        let rows = self
            .retry
            .run(|| self.adapter.fetch_documents(&query))
            .await?;
        trace.rows_fetched = Some(rows.len());
        trace.advance(RequestState::Executed)?;

        let projected = project_rows(&rows, &request.selection, &mask, &operation.type_name)?;
        let response = if operation.returns_list {
            Value::Array(projected)
        } else {
            projected.into_iter().next().unwrap_or(Value::Null)
        };
        trace.advance(RequestState::Projected)?;

        self.cache.set(key.to_string(), response.clone(), operation.cache_ttl());
        trace.advance(RequestState::CachePopulated)?;
        trace.advance(RequestState::Done)?;

        Ok(response)
    }
}

/// Render the statement `request` would run for `dialect`.
///
/// Needs no connection, so any dialect can be explained.
pub fn explain(
    registry: &OperationRegistry,
    limits: QueryLimits,
    dialect: &dyn SqlDialect,
    request: &QueryRequest,
) -> QueryResult<RenderedQuery> {
    let operation = registry.get(&request.operation)?;
    build_query(request, &operation, limits, dialect)?.to_sql(dialect)
}

/// Validate pagination and generate the retrieval query
fn build_query(
    request: &QueryRequest,
    operation: &OperationDef,
    limits: QueryLimits,
    dialect: &dyn SqlDialect,
) -> QueryResult<SelectQuery> {
    let limit = if operation.returns_list {
        let limit = request.limit.unwrap_or(limits.default_limit);
        if limit > limits.max_limit {
            return Err(QueryError::validation(format!(
                "limit {} exceeds the maximum of {}",
                limit, limits.max_limit
            )));
        }
        limit
    } else {
        1
    };

    let clause = match &request.filter {
        Some(filter) => Some(WhereGenerator::new(dialect, &operation.bindings).generate(filter)?),
        None => None,
    };

    Ok(operation.select(clause, limit, request.offset))
}

fn log_failure(err: &QueryError) {
    match err {
        QueryError::Validation(msg) => debug!(error = %msg, "request rejected"),
        QueryError::Internal(msg) => error!(error = %msg, "internal error"),
        QueryError::Execution { message, transient } => {
            warn!(error = %message, transient, "execution failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::auth::{FieldRule, FieldRuleTable};
    use crate::db::AdapterFuture;
    use crate::executor::CompiledSchema;
    use crate::filter::FilterOperator;
    use crate::selection::FieldSelection;
    use crate::sql::{BindingTable, DialectKind, StorageType};

    /// In-memory adapter returning fixed rows
    struct FakeAdapter {
        rows: Vec<Value>,
        calls: AtomicUsize,
        transient_failures: AtomicUsize,
        permanent_failure: bool,
        delay: Option<Duration>,
        last_sql: Mutex<Option<RenderedQuery>>,
    }

    impl FakeAdapter {
        fn new(rows: Vec<Value>) -> Self {
            Self {
                rows,
                calls: AtomicUsize::new(0),
                transient_failures: AtomicUsize::new(0),
                permanent_failure: false,
                delay: None,
                last_sql: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DatabaseAdapter for FakeAdapter {
        fn dialect(&self) -> &'static dyn SqlDialect {
            DialectKind::Postgres.dialect()
        }

        fn fetch_documents<'a>(&'a self, query: &'a SelectQuery) -> AdapterFuture<'a, Vec<Value>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.last_sql.lock() = query.to_sql(self.dialect()).ok();
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.permanent_failure {
                    return Err(QueryError::execution("relation does not exist"));
                }
                let remaining = self.transient_failures.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                    return Err(QueryError::transient("connection reset"));
                }
                Ok::<_, QueryError>(self.rows.clone())
            })
        }

        fn health_check(&self) -> AdapterFuture<'_, ()> {
            Box::pin(async { Ok::<_, QueryError>(()) })
        }
    }

    fn schema(field_rules: FieldRuleTable) -> CompiledSchema {
        let bindings = BindingTable::default()
            .with_document_field("email", StorageType::Text)
            .unwrap()
            .with_column("id", "id", StorageType::Integer)
            .unwrap();
        CompiledSchema {
            operations: vec![
                OperationDef::new("users", "v_user", "User", bindings.clone()),
                OperationDef::new("user_by_id", "v_user", "User", bindings.clone()).single_row(),
                OperationDef::new("audit", "v_audit", "Audit", bindings),
            ],
            field_rules,
        }
    }

    fn admin_only_email() -> FieldRuleTable {
        FieldRuleTable::new().with_rule("User", "email", FieldRule::roles(["admin"]))
    }

    fn registry() -> Arc<OperationRegistry> {
        Arc::new(OperationRegistry::from_schema(schema(admin_only_email())).unwrap())
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "email": "a@example.com", "name": "A"}),
            json!({"id": 2, "email": "b@example.com", "name": "B"}),
        ]
    }

    fn executor(adapter: Arc<FakeAdapter>) -> QueryExecutor {
        QueryExecutor::new(
            adapter,
            registry(),
            Arc::new(ResultCache::new(100, 4, Duration::from_secs(60))),
        )
        .with_retry(RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)))
    }

    fn admin() -> CallerIdentity {
        CallerIdentity::authenticated(uuid::Uuid::new_v4())
            .with_roles(["admin"])
            .with_tenant("acme")
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id", "email"]));

        let (first, trace) = executor.execute_traced(&request, &admin()).await;
        assert_eq!(
            first.unwrap(),
            json!([{"id": 1, "email": "a@example.com"}, {"id": 2, "email": "b@example.com"}])
        );
        assert_eq!(
            trace.states,
            vec![
                RequestState::Received,
                RequestState::ClauseBuilt,
                RequestState::CacheChecked,
                RequestState::CacheMiss,
                RequestState::Executed,
                RequestState::Projected,
                RequestState::CachePopulated,
                RequestState::Done,
            ]
        );

        let (second, trace) = executor.execute_traced(&request, &admin()).await;
        assert!(trace.was_cache_hit());
        assert_eq!(second.unwrap(), executor.execute(&request, &admin()).await.unwrap());
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_masked_field_is_absent_and_cached_separately() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id", "email"]));

        let admin_view = executor.execute(&request, &admin()).await.unwrap();
        let anon_view = executor
            .execute(&request, &CallerIdentity::anonymous().with_tenant("acme"))
            .await
            .unwrap();

        assert_eq!(anon_view, json!([{"id": 1}, {"id": 2}]));
        assert_ne!(admin_view, anon_view);
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn test_filter_is_parameterized() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let filter = FilterExpr::field("email", FilterOperator::Icontains, json!("example.com"));

        executor
            .execute_operation("users", Some(filter), SelectionSet::leaves(["id"]), &admin())
            .await
            .unwrap();

        let rendered = adapter.last_sql.lock().clone().unwrap();
        assert!(!rendered.sql.contains("example.com"));
        assert!(rendered.sql.contains("ILIKE $1"));
        assert_eq!(rendered.params[0], json!("%example.com%"));
    }

    #[tokio::test]
    async fn test_validation_error_short_circuits() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"])).filter(FilterExpr::and(vec![]));

        let (result, trace) = executor.execute_traced(&request, &admin()).await;
        assert!(matches!(result.unwrap_err(), QueryError::Validation(_)));
        assert_eq!(trace.states, vec![RequestState::Received, RequestState::Failed]);
        assert_eq!(adapter.calls(), 0);
    }

    #[tokio::test]
    async fn test_unbound_field_rejected() {
        let executor = executor(Arc::new(FakeAdapter::new(rows())));
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"]))
            .filter(FilterExpr::eq("password_hash", json!("x")));
        let err = executor.execute(&request, &admin()).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_limit_above_max_rejected() {
        let executor = executor(Arc::new(FakeAdapter::new(rows()))).with_limits(QueryLimits {
            default_limit: 10,
            max_limit: 50,
        });
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"])).limit(51);
        let err = executor.execute(&request, &admin()).await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        adapter.transient_failures.store(2, Ordering::SeqCst);
        let executor = executor(adapter.clone());

        let response = executor
            .execute(&QueryRequest::new("users", SelectionSet::leaves(["id"])), &admin())
            .await
            .unwrap();
        assert_eq!(response, json!([{"id": 1}, {"id": 2}]));
        assert_eq!(adapter.calls(), 3);
    }

    #[tokio::test]
    async fn test_execution_failure_is_not_cached() {
        let mut fake = FakeAdapter::new(rows());
        fake.permanent_failure = true;
        let adapter = Arc::new(fake);
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"]));

        let (result, trace) = executor.execute_traced(&request, &admin()).await;
        assert!(matches!(result.unwrap_err(), QueryError::Execution { transient: false, .. }));
        assert_eq!(trace.current(), RequestState::Failed);
        assert!(!trace.states.contains(&RequestState::CachePopulated));
        assert!(executor.cache().is_empty());
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_internal_and_not_cached() {
        let adapter = Arc::new(FakeAdapter::new(vec![json!({"id": 1, "profile": "scalar"})]));
        let executor = executor(adapter);
        let selection = SelectionSet::new().with(FieldSelection::object(
            "profile",
            "Profile",
            SelectionSet::leaves(["bio"]),
        ));
        let request = QueryRequest::new("users", selection);

        let err = executor.execute(&request, &admin()).await.unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
        assert_eq!(err.public_message(), "An internal error occurred");
        assert!(executor.cache().is_empty());
    }

    #[tokio::test]
    async fn test_single_row_operation() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let response = executor
            .execute_operation(
                "user_by_id",
                Some(FilterExpr::eq("id", json!(2))),
                SelectionSet::leaves(["id"]),
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(response, json!({"id": 1}));

        let rendered = adapter.last_sql.lock().clone().unwrap();
        assert!(rendered.sql.ends_with("LIMIT ($2)::bigint"));
        assert_eq!(rendered.params[1], json!(1));

        let empty = executor_with_rows(vec![])
            .execute_operation("user_by_id", None, SelectionSet::leaves(["id"]), &admin())
            .await
            .unwrap();
        assert_eq!(empty, Value::Null);
    }

    fn executor_with_rows(rows: Vec<Value>) -> QueryExecutor {
        executor(Arc::new(FakeAdapter::new(rows)))
    }

    #[tokio::test]
    async fn test_invalidate_operation() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"]));

        executor.execute(&request, &admin()).await.unwrap();
        assert_eq!(executor.invalidate_operation("users").unwrap(), 1);
        executor.execute(&request, &admin()).await.unwrap();
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_source_covers_every_operation_on_view() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let ids = SelectionSet::leaves(["id"]);

        executor.execute_operation("users", None, ids.clone(), &admin()).await.unwrap();
        executor.execute_operation("user_by_id", None, ids.clone(), &admin()).await.unwrap();
        executor.execute_operation("audit", None, ids.clone(), &admin()).await.unwrap();
        assert_eq!(executor.cache().len(), 3);

        assert_eq!(executor.invalidate_source("v_user").unwrap(), 2);
        assert_eq!(executor.cache().len(), 1);
        assert_eq!(executor.invalidate_source("v_missing").unwrap(), 0);

        executor.execute_operation("audit", None, ids, &admin()).await.unwrap();
        assert_eq!(adapter.calls(), 3);
    }

    #[tokio::test]
    async fn test_schema_reload_is_not_served_from_stale_cache() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id", "email"]));
        let anon = CallerIdentity::anonymous().with_tenant("acme");

        let before = executor.execute(&request, &anon).await.unwrap();
        assert_eq!(before, json!([{"id": 1}, {"id": 2}]));

        // email becomes public; the old masked response must not come back
        executor.reload_schema(schema(FieldRuleTable::new())).unwrap();
        assert!(executor.cache().is_empty());

        let after = executor.execute(&request, &anon).await.unwrap();
        assert_eq!(
            after,
            json!([{"id": 1, "email": "a@example.com"}, {"id": 2, "email": "b@example.com"}])
        );
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn test_rule_change_on_shared_registry_misses_cache() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id", "email"]));
        let anon = CallerIdentity::anonymous().with_tenant("acme");

        executor.execute(&request, &anon).await.unwrap();
        // Changed behind the executor's back: no cache clear
        executor.registry().set_field_rules(FieldRuleTable::new());

        let (after, trace) = executor.execute_traced(&request, &anon).await;
        assert!(!trace.was_cache_hit());
        assert_eq!(after.unwrap()[0]["email"], json!("a@example.com"));
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_cache() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"]));
        executor.execute(&request, &admin()).await.unwrap();

        let mut bad = schema(FieldRuleTable::new());
        bad.operations[0].source = "v_user;".into();
        assert!(executor.reload_schema(bad).is_err());
        assert_eq!(executor.cache().len(), 1);

        executor.execute(&request, &admin()).await.unwrap();
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_request_leaves_cache_untouched() {
        let mut fake = FakeAdapter::new(rows());
        fake.delay = Some(Duration::from_secs(5));
        let adapter = Arc::new(fake);
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"]));

        let outcome = tokio::time::timeout(Duration::from_millis(20), executor.execute(&request, &admin())).await;
        assert!(outcome.is_err());
        assert_eq!(adapter.calls(), 1);
        assert!(executor.cache().is_empty());
        assert_eq!(executor.cache().metrics().inserts, 0);

        // The shared cache still works for a request that completes
        let quick = Arc::new(FakeAdapter::new(rows()));
        let executor = QueryExecutor::new(quick, executor.registry().clone(), executor.cache().clone());
        assert_eq!(
            executor.execute(&request, &admin()).await.unwrap(),
            json!([{"id": 1}, {"id": 2}])
        );
        assert_eq!(executor.cache().metrics().inserts, 1);
    }

    #[test]
    fn test_explain_renders_without_executing() {
        let adapter = Arc::new(FakeAdapter::new(rows()));
        let executor = executor(adapter.clone());
        let request = QueryRequest::new("users", SelectionSet::leaves(["id"]))
            .filter(FilterExpr::eq("email", json!("a@example.com")))
            .limit(5);

        let rendered = executor.explain(&request).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT data FROM v_user WHERE data->>'email' = $1 LIMIT ($2)::bigint"
        );
        assert_eq!(rendered.params.len(), 2);
        assert_eq!(adapter.calls(), 0);
    }
}
