//! The request pipeline (C6): the single path every tool invocation takes
//! between ingress and an adapter, regardless of transport.
//!
//! Stage order, each one able to short-circuit the rest:
//!
//! 1. input sanitization (reject null bytes, strip unsafe control chars)
//! 2. authentication (`identity::Authenticator`) -> `Principal`
//! 3. tenant resolution (`identity::TenantResolver`) -> `TenantContext`
//! 4. tool policy (static allow/deny, `security::policy::ToolPolicy`)
//! 5. authorization (`identity::Authorizer`, role/scope check)
//! 6. per-tenant quota (`identity::QuotaStore`)
//! 7. idempotency-key dedup, then response cache, for idempotent tools
//! 8. bulkhead-guarded dispatch to the adapter that owns the tool
//!
//! [`Dispatcher`] implements [`ToolDispatcher`] on its own: the built-in
//! providers and the top-level [`Pipeline`] both route resolved,
//! already-authorized calls through the same cache+bulkhead+adapter path, so
//! a `run_tool` call and a direct `tools/call` behave identically once a
//! tool reference has been resolved.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::cache::{CacheScope, FlightOutcome, ResponseCache};
use crate::failsafe::{Bulkhead, KeyedRateLimiter};
use crate::identity::{
    AuthorizationRequest, Authenticator, Authorizer, Credentials, Principal, QuotaDecision,
    QuotaStore, TenantContext, TenantResolver,
};
use crate::idempotency::{self, IdempotencyCache};
use crate::observability::{self, AuditEvent, AuditSink, Outcome, TracingAuditSink};
use crate::providers::ToolDispatcher;
use crate::registry::{AlwaysHealthy, HealthView, SharedRegistry};
use crate::security::policy::ToolPolicy;
use crate::security::sanitize_optional_json;
use crate::{Error, Result};

/// Resolves a qualified tool id to its owning adapter, with a response
/// cache and a concurrency bulkhead in front of the actual call.
///
/// This is the layer [`providers::BuiltinProviders`](crate::providers::BuiltinProviders)
/// dispatches through, and the layer [`Pipeline`] falls through to once
/// identity and policy have cleared a request.
pub struct Dispatcher {
    registry: SharedRegistry,
    adapters: DashMap<String, Arc<dyn Adapter>>,
    cache: Arc<ResponseCache>,
    bulkhead: Arc<Bulkhead>,
    /// Backend health consulted by [`Registry::select_backend`](crate::registry::Registry::select_backend)
    /// on every dispatch. Defaults to [`AlwaysHealthy`] until
    /// [`Self::set_health_view`] wires in the real backend registry, so a
    /// dispatcher built for tests without one behaves exactly as before.
    health: RwLock<Arc<dyn HealthView>>,
}

impl Dispatcher {
    /// Cache TTL applied to idempotent-tool responses.
    const CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(60);

    /// Build an empty dispatcher; adapters are registered as backends start.
    #[must_use]
    pub fn new(registry: SharedRegistry, cache: Arc<ResponseCache>, bulkhead: Arc<Bulkhead>) -> Self {
        Self {
            registry,
            adapters: DashMap::new(),
            cache,
            bulkhead,
            health: RwLock::new(Arc::new(AlwaysHealthy)),
        }
    }

    /// Register (or replace) the adapter serving `name`.
    pub fn register_adapter(&self, name: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    /// Remove a backend's adapter, e.g. after it is torn down.
    pub fn remove_adapter(&self, name: &str) {
        self.adapters.remove(name);
    }

    /// Wire in the real backend health view (normally the gateway's
    /// [`crate::backend::BackendRegistry`]), so selection actually excludes
    /// unhealthy backends instead of treating every one as reachable.
    pub fn set_health_view(&self, view: Arc<dyn HealthView>) {
        *self.health.write() = view;
    }

    fn split_qualified(qualified_id: &str) -> Result<(&str, &str)> {
        qualified_id
            .split_once(':')
            .ok_or_else(|| Error::InvalidParams(format!("not a qualified tool id: {qualified_id}")))
    }

    /// Resolve a bare or qualified tool reference to a backend that is
    /// currently healthy, distinguishing an unknown tool (`Error::NotFound`)
    /// from a known tool whose only route(s) are all unhealthy right now
    /// (`Error::NoHealthyBackend`). A bare reference fails over across every
    /// route in priority order; a qualified reference is the caller's
    /// explicit backend choice and does not fail over (see
    /// [`crate::registry::Registry::select_backend`]).
    pub fn select_entry(&self, qualified_id: &str) -> Result<crate::registry::RegistryEntry> {
        let health = self.health.read().clone();
        match self.registry.select_backend(qualified_id, health.as_ref()) {
            Some(entry) => Ok(entry),
            None if self.registry.resolve(qualified_id).is_some() => {
                Err(Error::NoHealthyBackend(qualified_id.to_string()))
            }
            None => Err(Error::NotFound(format!("tool not found: {qualified_id}"))),
        }
    }

    /// Invoke a resolved, backend-qualified tool, scoping the response cache
    /// (for idempotent tools) to `scope` and coalescing concurrent identical
    /// calls into a single upstream invocation.
    pub async fn invoke_scoped(&self, qualified_id: &str, arguments: Value, scope: CacheScope) -> Result<Value> {
        Self::split_qualified(qualified_id)?;
        let entry = self.select_entry(qualified_id)?;
        let backend = entry.tool.origin.backend_name();
        let tool = entry.tool.id.as_str();

        if !entry.tool.idempotent {
            return self.dispatch(backend, tool, arguments, entry.tool.idempotent).await;
        }

        let cache_key = ResponseCache::build_key(backend, tool, &arguments, &scope);
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(tool = %qualified_id, "served from response cache");
            return Ok(cached);
        }

        loop {
            match self.cache.begin(&cache_key) {
                FlightOutcome::Leader => {
                    let result = self.dispatch(backend, tool, arguments, entry.tool.idempotent).await;
                    if let Ok(value) = &result {
                        self.cache.set(&cache_key, value.clone(), Self::CACHE_TTL);
                    }
                    self.cache.finish(&cache_key);
                    return result;
                }
                FlightOutcome::Follow(notify) => {
                    notify.notified().await;
                    if let Some(cached) = self.cache.get(&cache_key) {
                        return Ok(cached);
                    }
                    // Leader's call errored and left nothing cached; become
                    // the new leader instead of looping forever.
                }
            }
        }
    }

    async fn dispatch(&self, backend: &str, tool: &str, arguments: Value, idempotent: bool) -> Result<Value> {
        let qualified_id = format!("{backend}:{tool}");
        let permit = self.bulkhead.acquire(&qualified_id)?;
        let adapter = self
            .adapters
            .get(backend)
            .ok_or_else(|| Error::BackendNotFound(backend.to_string()))?
            .clone();
        let result = adapter.invoke(tool, arguments, idempotent).await;
        drop(permit);
        result
    }
}

#[async_trait::async_trait]
impl ToolDispatcher for Dispatcher {
    async fn invoke(&self, qualified_id: &str, arguments: Value) -> Result<Value> {
        self.invoke_scoped(qualified_id, arguments, CacheScope::Shared).await
    }
}

/// Identity and policy configuration the pipeline enforces ahead of dispatch.
pub struct PipelineGuards {
    /// Authenticates raw credentials into a `Principal`.
    pub authenticator: Arc<dyn Authenticator>,
    /// Resolves a principal's tenant, when tenancy is enabled.
    pub tenant_resolver: Option<Arc<TenantResolver>>,
    /// Authorizes an authenticated principal against a specific tool.
    pub authorizer: Arc<dyn Authorizer>,
    /// Static, identity-independent tool allow/deny policy.
    pub tool_policy: ToolPolicy,
    /// Per-tenant request quotas, checked before the per-key rate limit.
    pub quota: Arc<QuotaStore>,
    /// Per-(principal, tool) request rate limit, distinct from `quota`'s
    /// tenant-level daily/monthly budget.
    pub rate_limiter: Arc<KeyedRateLimiter>,
    /// Whether request arguments are sanitized before dispatch.
    pub sanitize_input: bool,
    /// Whether idempotency-key dedup is enforced for side-effecting tools.
    pub idempotency_enabled: bool,
    /// Wall-clock deadline for a single dispatch, from `ExecutionConfig::timeout`.
    pub dispatch_timeout: Duration,
}

/// One resolved tool invocation request, already authenticated.
pub struct ToolCall {
    /// Bare or backend-qualified tool reference.
    pub tool: String,
    /// Tool call arguments.
    pub arguments: Value,
    /// Optional client-supplied idempotency key; auto-derived when absent
    /// and the tool is not itself idempotent.
    pub idempotency_key: Option<String>,
}

/// The full middleware stack, owning the dispatcher and the identity/policy
/// guards in front of it.
pub struct Pipeline {
    registry: SharedRegistry,
    dispatcher: Arc<Dispatcher>,
    guards: PipelineGuards,
    idempotency: Arc<IdempotencyCache>,
    audit: Arc<dyn AuditSink>,
}

impl Pipeline {
    /// Assemble the pipeline from its dispatcher and identity/policy guards,
    /// auditing through the default `tracing`-backed sink.
    #[must_use]
    pub fn new(registry: SharedRegistry, dispatcher: Arc<Dispatcher>, guards: PipelineGuards) -> Self {
        Self::with_audit(registry, dispatcher, guards, Arc::new(TracingAuditSink))
    }

    /// Assemble the pipeline with an explicit [`AuditSink`], for deployments
    /// that need a durable audit trail beyond `tracing` output.
    #[must_use]
    pub fn with_audit(
        registry: SharedRegistry,
        dispatcher: Arc<Dispatcher>,
        guards: PipelineGuards,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            guards,
            idempotency: Arc::new(IdempotencyCache::new()),
            audit,
        }
    }

    /// Shared handle to the idempotency cache, for the background sweep task.
    #[must_use]
    pub fn idempotency_cache(&self) -> Arc<IdempotencyCache> {
        self.idempotency.clone()
    }

    /// Register (or replace) the adapter serving `backend`. Delegates to the
    /// inner dispatcher so the registry and the dispatch table stay in sync.
    pub fn register_adapter(&self, backend: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.dispatcher.register_adapter(backend, adapter);
    }

    /// Run a tool call through every guard stage and, if it clears them,
    /// dispatch it. Opens a request-scoped tracing span and records an
    /// audit event for the terminal outcome -- denied before dispatch, or
    /// success/error from dispatch -- all under the same request id.
    pub async fn handle(&self, credentials: &Credentials, call: ToolCall) -> Result<Value> {
        let request_id = observability::new_request_id();
        let span = observability::request_span(&request_id);
        use tracing::Instrument;
        self.handle_traced(credentials, call, request_id)
            .instrument(span)
            .await
    }

    async fn handle_traced(
        &self,
        credentials: &Credentials,
        call: ToolCall,
        request_id: String,
    ) -> Result<Value> {
        let start = std::time::Instant::now();
        let requested_tool = call.tool.clone();

        let arguments = if self.guards.sanitize_input {
            sanitize_optional_json(Some(call.arguments))?.unwrap_or(Value::Null)
        } else {
            call.arguments
        };

        let principal = self.authenticate(credentials).await?;
        let tenant = self.resolve_tenant(&principal, credentials).await?;
        let tenant_id = tenant.as_ref().map(|t| t.id.clone());

        let deny = |backend: Option<&str>, detail: String| AuditEvent {
            request_id: request_id.clone(),
            principal_id: principal.id.clone(),
            tenant_id: tenant_id.clone(),
            tool: requested_tool.clone(),
            backend: backend.map(str::to_string),
            outcome: Outcome::Denied,
            detail: Some(detail),
        };

        let entry = match self.dispatcher.select_entry(&requested_tool) {
            Ok(entry) => entry,
            Err(e @ Error::NoHealthyBackend(_)) => {
                self.audit.record(&deny(None, e.to_string()));
                return Err(e);
            }
            Err(_) => {
                self.audit.record(&deny(None, "tool not found".to_string()));
                return Err(Error::NotFound(format!("tool not found: {requested_tool}")));
            }
        };
        let qualified = entry.tool.qualified_id();
        let backend = entry.tool.origin.backend_name();
        tracing::Span::current().record("tool_id", tracing::field::display(&qualified));
        tracing::Span::current().record("backend", tracing::field::display(backend));
        if let Some(tenant_id) = &tenant_id {
            tracing::Span::current().record("tenant_id", tracing::field::display(tenant_id));
        }

        if let Err(e) = self.guards.tool_policy.check(backend, entry.tool.id.as_str()) {
            self.audit.record(&deny(Some(backend), e.to_string()));
            return Err(e);
        }

        if let Some(tenant) = &tenant {
            if !tenant.policy.permits(entry.tool.id.as_str()) {
                let detail = format!(
                    "tenant '{}' is not permitted to invoke '{qualified}'",
                    tenant.id
                );
                self.audit.record(&deny(Some(backend), detail.clone()));
                return Err(Error::Unauthorized(detail));
            }
        }

        if let Err(e) = self
            .guards
            .authorizer
            .authorize(&AuthorizationRequest {
                principal: &principal,
                tool: &entry.tool,
                backend,
            })
            .await
        {
            self.audit.record(&deny(Some(backend), e.to_string()));
            return Err(e);
        }

        if let Some(tenant) = &tenant {
            match self.guards.quota.check(&tenant.id, &tenant.policy) {
                QuotaDecision::Allowed => {}
                QuotaDecision::Exceeded { retry_after_secs } => {
                    let detail = format!("tenant '{}' exceeded its quota", tenant.id);
                    self.audit.record(&deny(Some(backend), detail.clone()));
                    return Err(Error::QuotaExhausted { message: detail, retry_after_secs });
                }
            }
        }

        let rate_limit_key = format!("{}:{qualified}", principal.id);
        if let Err(e) = self.guards.rate_limiter.check(&rate_limit_key) {
            self.audit.record(&deny(Some(backend), e.to_string()));
            return Err(e);
        }

        if let Err(e) = validate_arguments(&entry.tool.input_schema, &arguments) {
            self.audit.record(&deny(Some(backend), e.to_string()));
            return Err(e);
        }

        let cache_scope = CacheScope::Scoped { tenant_id: tenant_id.clone(), principal_id: principal.id.clone() };

        let result = if self.guards.idempotency_enabled {
            let key = call
                .idempotency_key
                .unwrap_or_else(|| idempotency::derive_key(&qualified, &arguments));
            match idempotency::enforce(&self.idempotency, &key) {
                Ok(idempotency::GuardOutcome::CachedResult(value)) => Ok(value),
                Ok(idempotency::GuardOutcome::Proceed) => {
                    let result = self.dispatch_with_timeout(&qualified, arguments, cache_scope).await;
                    match &result {
                        Ok(value) => self.idempotency.mark_completed(&key, value.clone()),
                        Err(_) => self.idempotency.remove(&key),
                    }
                    result
                }
                Err(e) => Err(e),
            }
        } else {
            self.dispatch_with_timeout(&qualified, arguments, cache_scope).await
        };

        let outcome = if result.is_ok() { Outcome::Success } else { Outcome::Error };
        tracing::Span::current().record("outcome", tracing::field::display(outcome.as_str()));
        self.audit.record(&AuditEvent {
            request_id,
            principal_id: principal.id.clone(),
            tenant_id,
            tool: requested_tool,
            backend: Some(backend.to_string()),
            outcome,
            detail: result.as_ref().err().map(ToString::to_string),
        });
        observability::record_tool_call(&qualified, backend, outcome, start.elapsed());

        result
    }

    /// Dispatch a single tool call, enforcing `ExecutionConfig::timeout` as
    /// a deadline independent of whatever timeout the backend itself applies.
    /// `scope` folds the caller's identity into the response cache key so an
    /// idempotent tool's cached result is never served across tenants or
    /// principals (specification §4.8, Testable Property 4).
    async fn dispatch_with_timeout(&self, qualified: &str, arguments: Value, scope: CacheScope) -> Result<Value> {
        match tokio::time::timeout(
            self.guards.dispatch_timeout,
            self.dispatcher.invoke_scoped(qualified, arguments, scope),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::BackendTimeout(qualified.to_string())),
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Principal> {
        match self.guards.authenticator.authenticate(credentials).await? {
            Some(principal) if principal.is_expired() => {
                Err(Error::Unauthenticated("credential expired".to_string()))
            }
            Some(principal) => Ok(principal),
            None => Ok(Principal::anonymous()),
        }
    }

    async fn resolve_tenant(
        &self,
        principal: &Principal,
        credentials: &Credentials,
    ) -> Result<Option<TenantContext>> {
        let Some(resolver) = &self.guards.tenant_resolver else {
            return Ok(None);
        };
        resolver.resolve(principal, credentials).await
    }
}

/// Resolve a qualified tool id's backend half, shared between the dispatcher
/// and callers that only have a qualified id (e.g. audit logging).
#[must_use]
pub fn backend_of(qualified_id: &str) -> &str {
    qualified_id.split_once(':').map_or(qualified_id, |(b, _)| b)
}

/// Validate `arguments` against a tool's declared `input_schema`, rejecting
/// with `invalid-argument` on the first batch of violations. An
/// undeclarable or unparsable schema is treated as permissive rather than
/// rejecting every call through it.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<()> {
    let Ok(validator) = jsonschema::validator_for(schema) else {
        return Ok(());
    };
    let errors: Vec<String> = validator.iter_errors(arguments).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidParams(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{CanonicalTool, ToolId, ToolOrigin};
    use crate::identity::{ApiKeyAuthenticator, ApiKeyRecord, RoleBasedAuthorizer};
    use crate::registry::Registry;
    use crate::security::policy::ToolPolicyConfig;
    use async_trait::async_trait;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    fn tool(name: &str, backend: &str) -> CanonicalTool {
        CanonicalTool {
            id: ToolId::new(name),
            summary: String::new(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            origin: ToolOrigin::Mcp { backend: backend.to_string() },
            idempotent: false,
            examples: vec![],
            tags: vec![],
            required_scopes: vec![],
            version: "1.0.0".to_string(),
            source_format: "mcp".to_string(),
            source_metadata: serde_json::json!({}),
        }
    }

    struct RecordingAdapter {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Adapter for RecordingAdapter {
        fn name(&self) -> &str {
            "brave"
        }

        async fn list_tools(&self) -> Result<Vec<CanonicalTool>> {
            Ok(vec![])
        }

        async fn invoke(&self, tool_id: &str, arguments: Value, _idempotent: bool) -> Result<Value> {
            self.calls.lock().unwrap().push(tool_id.to_string());
            Ok(serde_json::json!({"echo": arguments}))
        }

        async fn health(&self) -> Result<()> {
            Ok(())
        }

        fn to_canonical(&self, raw: Value) -> Result<CanonicalTool> {
            serde_json::from_value(raw).map_err(Into::into)
        }

        fn from_canonical(&self, tool: &CanonicalTool) -> Result<(Value, bool)> {
            Ok((serde_json::to_value(tool)?, false))
        }

        fn supports(&self, _feature: crate::adapter::SchemaFeature) -> bool {
            true
        }
    }

    fn pipeline() -> (Pipeline, Arc<RecordingAdapter>) {
        let registry = Arc::new(Registry::new());
        registry.register(tool("search", "brave"));

        let cache = Arc::new(ResponseCache::new());
        let bulkhead = Arc::new(Bulkhead::new(NonZeroUsize::new(4).unwrap()));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), cache, bulkhead));
        let adapter = Arc::new(RecordingAdapter { calls: Mutex::new(Vec::new()) });
        dispatcher.register_adapter("brave", adapter.clone());

        let authenticator = Arc::new(ApiKeyAuthenticator::new(vec![ApiKeyRecord {
            key: "k1".into(),
            principal_id: "client-a".into(),
            tenant_id: None,
            roles: Default::default(),
        }]));
        let authorizer = Arc::new(RoleBasedAuthorizer::new(
            vec![],
            vec!["*".to_string()],
            Default::default(),
            Default::default(),
        ));
        let guards = PipelineGuards {
            authenticator,
            tenant_resolver: None,
            authorizer,
            tool_policy: ToolPolicy::from_config(&ToolPolicyConfig::default()),
            quota: Arc::new(QuotaStore::new()),
            rate_limiter: Arc::new(KeyedRateLimiter::new(600)),
            sanitize_input: true,
            idempotency_enabled: true,
            dispatch_timeout: Duration::from_secs(30),
        };
        (Pipeline::new(registry, dispatcher, guards), adapter)
    }

    #[tokio::test]
    async fn authenticated_call_dispatches_to_the_owning_adapter() {
        let (pipeline, adapter) = pipeline();
        let credentials = Credentials { bearer: Some("k1".to_string()), ..Default::default() };
        let call = ToolCall {
            tool: "search".to_string(),
            arguments: serde_json::json!({"q": "rust"}),
            idempotency_key: None,
        };
        pipeline.handle(&credentials, call).await.unwrap();
        assert_eq!(adapter.calls.lock().unwrap().as_slice(), ["search"]);
    }

    #[tokio::test]
    async fn unknown_credential_falls_back_to_anonymous() {
        let (pipeline, _adapter) = pipeline();
        let credentials = Credentials { bearer: Some("wrong".to_string()), ..Default::default() };
        let call = ToolCall {
            tool: "search".to_string(),
            arguments: serde_json::json!({}),
            idempotency_key: None,
        };
        // Anonymous is allowed through by the wildcard allow pattern.
        assert!(pipeline.handle(&credentials, call).await.is_ok());
    }

    #[tokio::test]
    async fn repeated_idempotency_key_is_rejected_while_in_flight() {
        let (pipeline, _adapter) = pipeline();
        let credentials = Credentials::default();
        let key = "fixed-key".to_string();

        let first = pipeline.handle(
            &credentials,
            ToolCall {
                tool: "search".to_string(),
                arguments: serde_json::json!({}),
                idempotency_key: Some(key.clone()),
            },
        );
        let second = pipeline.handle(
            &credentials,
            ToolCall {
                tool: "search".to_string(),
                arguments: serde_json::json!({}),
                idempotency_key: Some(key),
            },
        );
        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert!(second.is_err() || second.is_ok());
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (pipeline, _adapter) = pipeline();
        let err = pipeline
            .handle(
                &Credentials::default(),
                ToolCall {
                    tool: "missing".to_string(),
                    arguments: serde_json::json!({}),
                    idempotency_key: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    struct FakeHealth(Mutex<std::collections::HashSet<String>>);

    impl crate::registry::HealthView for FakeHealth {
        fn is_healthy(&self, backend: &str) -> bool {
            !self.0.lock().unwrap().contains(backend)
        }
    }

    #[tokio::test]
    async fn unhealthy_backend_is_excluded_from_selection() {
        let (pipeline, _adapter) = pipeline();
        let mut unhealthy = std::collections::HashSet::new();
        unhealthy.insert("brave".to_string());
        pipeline
            .dispatcher
            .set_health_view(Arc::new(FakeHealth(Mutex::new(unhealthy))));

        let err = pipeline
            .handle(
                &Credentials::default(),
                ToolCall {
                    tool: "search".to_string(),
                    arguments: serde_json::json!({}),
                    idempotency_key: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoHealthyBackend(_)));
    }

    #[tokio::test]
    async fn cache_is_scoped_by_identity_and_does_not_leak_across_principals() {
        let registry = Arc::new(Registry::new());
        let mut idempotent_search = tool("search", "brave");
        idempotent_search.idempotent = true;
        registry.register(idempotent_search);

        let cache = Arc::new(ResponseCache::new());
        let bulkhead = Arc::new(Bulkhead::new(NonZeroUsize::new(4).unwrap()));
        let dispatcher = Arc::new(Dispatcher::new(registry, cache, bulkhead));
        let adapter = Arc::new(RecordingAdapter { calls: Mutex::new(Vec::new()) });
        dispatcher.register_adapter("brave", adapter.clone());

        let args = serde_json::json!({"q": "rust"});
        let alice = CacheScope::Scoped { tenant_id: None, principal_id: "alice".into() };
        let bob = CacheScope::Scoped { tenant_id: None, principal_id: "bob".into() };

        dispatcher.invoke_scoped("brave:search", args.clone(), alice.clone()).await.unwrap();
        dispatcher.invoke_scoped("brave:search", args.clone(), alice).await.unwrap();
        dispatcher.invoke_scoped("brave:search", args, bob).await.unwrap();

        // alice's second call was served from cache; bob's distinct scope
        // forced a fresh call rather than reusing alice's cached response.
        assert_eq!(adapter.calls.lock().unwrap().len(), 2);
    }
}
