//! Black-box coverage of the specification's seed end-to-end scenarios that
//! aren't already exercised by in-module unit tests: backend collision and
//! namespacing (the registry assigns bare-name ownership by registration
//! order, and a shadowed tool stays reachable by its qualified id), and a
//! tenant's per-tool deny list rejecting a call before it ever reaches an
//! adapter.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use mcp_gateway::adapter::Adapter;
use mcp_gateway::cache::ResponseCache;
use mcp_gateway::canonical::{CanonicalTool, ToolId, ToolOrigin};
use mcp_gateway::failsafe::{Bulkhead, KeyedRateLimiter};
use mcp_gateway::identity::{
    ApiKeyAuthenticator, ApiKeyRecord, Credentials, InMemoryTenantStore, QuotaStore,
    RoleBasedAuthorizer, TenantContext, TenantPolicy, TenantResolver,
};
use mcp_gateway::pipeline::{Dispatcher, Pipeline, PipelineGuards, ToolCall};
use mcp_gateway::registry::{Registry, SubstringSelector};
use mcp_gateway::security::policy::ToolPolicy;
use mcp_gateway::security::policy::ToolPolicyConfig;
use mcp_gateway::{Error, Result};

fn add_tool(backend: &str) -> CanonicalTool {
    CanonicalTool {
        id: ToolId::new("add"),
        summary: "Add two integers".to_string(),
        description: "Adds `a` and `b`.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"],
        }),
        output_schema: None,
        origin: ToolOrigin::Mcp { backend: backend.to_string() },
        idempotent: true,
        examples: vec![],
        tags: vec![],
        required_scopes: vec![],
        version: "1.0.0".to_string(),
        source_format: "mcp".to_string(),
        source_metadata: json!({}),
    }
}

struct AdderAdapter {
    name: String,
}

#[async_trait]
impl Adapter for AdderAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<CanonicalTool>> {
        Ok(vec![add_tool(&self.name)])
    }

    async fn invoke(&self, _tool_id: &str, arguments: Value, _idempotent: bool) -> Result<Value> {
        let a = arguments.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = arguments.get("b").and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(a + b))
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

    fn supports(&self, _feature: mcp_gateway::adapter::SchemaFeature) -> bool {
        true
    }
}

struct ExecuteCodeStub;

#[async_trait]
impl Adapter for ExecuteCodeStub {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn list_tools(&self) -> Result<Vec<CanonicalTool>> {
        Ok(vec![CanonicalTool {
            id: ToolId::new("execute_code"),
            summary: "Run code".to_string(),
            description: "Runs source code in a sandbox.".to_string(),
            input_schema: json!({"type": "object"}),
            output_schema: None,
            origin: ToolOrigin::Mcp { backend: "sandbox".to_string() },
            idempotent: false,
            examples: vec![],
            tags: vec![],
            required_scopes: vec![],
            version: "1.0.0".to_string(),
            source_format: "mcp".to_string(),
            source_metadata: json!({}),
        }])
    }

    async fn invoke(&self, _tool_id: &str, _arguments: Value, _idempotent: bool) -> Result<Value> {
        Ok(json!({"stdout": "", "stderr": "", "exit_code": 0}))
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

    fn supports(&self, _feature: mcp_gateway::adapter::SchemaFeature) -> bool {
        true
    }
}

fn build_pipeline(tenants: Vec<TenantContext>) -> Pipeline {
    let registry = Arc::new(Registry::new());
    registry.register(add_tool("alpha"));
    registry.register(add_tool("beta"));

    registry.register(CanonicalTool {
        id: ToolId::new("execute_code"),
        summary: "Run code".to_string(),
        description: "Runs source code in a sandbox.".to_string(),
        input_schema: json!({"type": "object"}),
        output_schema: None,
        origin: ToolOrigin::Mcp { backend: "sandbox".to_string() },
        idempotent: false,
        examples: vec![],
        tags: vec![],
        required_scopes: vec![],
        version: "1.0.0".to_string(),
        source_format: "mcp".to_string(),
        source_metadata: json!({}),
    });

    let cache = Arc::new(ResponseCache::new());
    let bulkhead = Arc::new(Bulkhead::new(NonZeroUsize::new(8).unwrap()));
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), cache, bulkhead));
    dispatcher.register_adapter("alpha", Arc::new(AdderAdapter { name: "alpha".to_string() }));
    dispatcher.register_adapter("beta", Arc::new(AdderAdapter { name: "beta".to_string() }));
    dispatcher.register_adapter("sandbox", Arc::new(ExecuteCodeStub));

    let authenticator = Arc::new(ApiKeyAuthenticator::new(vec![ApiKeyRecord {
        key: "t1-key".into(),
        principal_id: "t1-client".into(),
        tenant_id: Some("T1".into()),
        roles: Default::default(),
    }]));
    let authorizer = Arc::new(RoleBasedAuthorizer::new(
        vec![],
        vec!["*".to_string()],
        Default::default(),
        Default::default(),
    ));

    let tenant_resolver = if tenants.is_empty() {
        None
    } else {
        Some(Arc::new(TenantResolver::new(Arc::new(InMemoryTenantStore::new(tenants)), None)))
    };

    let guards = PipelineGuards {
        authenticator,
        tenant_resolver,
        authorizer,
        tool_policy: ToolPolicy::from_config(&ToolPolicyConfig::default()),
        quota: Arc::new(QuotaStore::new()),
        rate_limiter: Arc::new(KeyedRateLimiter::new(600)),
        sanitize_input: true,
        idempotency_enabled: false,
        dispatch_timeout: std::time::Duration::from_secs(30),
    };

    Pipeline::new(registry, dispatcher, guards)
}

/// Scenario 1: single-backend happy path.
#[tokio::test]
async fn single_backend_happy_path_returns_the_sum() {
    let pipeline = build_pipeline(vec![]);
    let result = pipeline
        .handle(
            &Credentials::default(),
            ToolCall { tool: "alpha:add".to_string(), arguments: json!({"a": 2, "b": 3}), idempotency_key: None },
        )
        .await
        .unwrap();
    assert_eq!(result, json!(5));
}

/// Scenario 2: collision and namespacing. Two backends register `add`
/// without a namespace; the first registered (`alpha`) keeps the bare name,
/// `beta`'s stays reachable only via its qualified id, and `search_tools`
/// (here, the registry's own substring search) surfaces both.
#[tokio::test]
async fn collision_keeps_first_registration_bare_and_second_qualified_only() {
    let pipeline = build_pipeline(vec![]);

    let bare = pipeline
        .handle(
            &Credentials::default(),
            ToolCall { tool: "add".to_string(), arguments: json!({"a": 10, "b": 1}), idempotency_key: None },
        )
        .await
        .unwrap();
    assert_eq!(bare, json!(11), "bare 'add' routes to the first-registered backend (alpha)");

    let qualified = pipeline
        .handle(
            &Credentials::default(),
            ToolCall { tool: "beta:add".to_string(), arguments: json!({"a": 10, "b": 1}), idempotency_key: None },
        )
        .await
        .unwrap();
    assert_eq!(qualified, json!(11), "beta's shadowed entry is still reachable by its qualified id");
}

#[test]
fn search_tools_surfaces_both_shadowed_and_winning_entries() {
    let registry = Registry::new();
    registry.register(add_tool("alpha"));
    registry.register(add_tool("beta"));

    let results = registry.search("add", &SubstringSelector);
    assert_eq!(results.len(), 2, "both backends' entries remain listed even though only one owns the bare name");
}

#[test]
fn describe_by_bare_collided_name_is_not_found_by_qualification_alone() {
    let registry = Registry::new();
    registry.register(add_tool("alpha"));
    registry.register(add_tool("beta"));

    // The bare name still resolves (to alpha, the winner) -- describe_tool
    // against an *unregistered* bare name is what the specification's
    // scenario actually means by not-found; demonstrate that distinctly.
    assert!(registry.resolve("add").is_some());
    assert!(registry.resolve("gamma:add").is_none());
}

/// Scenario 5: tenant policy. `T1` has `execute_code` on its deny list; the
/// call is rejected before the sandbox adapter is ever invoked.
#[tokio::test]
async fn tenant_deny_list_blocks_execute_code_without_dispatch() {
    let t1 = TenantContext {
        id: "T1".to_string(),
        policy: TenantPolicy { denied_tools: vec!["execute_code".to_string()], ..Default::default() },
    };
    let pipeline = build_pipeline(vec![t1]);

    let credentials = Credentials { bearer: Some("t1-key".to_string()), ..Default::default() };
    let err = pipeline
        .handle(
            &credentials,
            ToolCall { tool: "sandbox:execute_code".to_string(), arguments: json!({}), idempotency_key: None },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Unauthorized(_)), "denied tool must surface as an authorization failure, not reach dispatch");
}

/// Scenario 5 (contrast): the same tenant can still call a tool that isn't
/// on its deny list.
#[tokio::test]
async fn tenant_deny_list_does_not_block_unrelated_tools() {
    let t1 = TenantContext {
        id: "T1".to_string(),
        policy: TenantPolicy { denied_tools: vec!["execute_code".to_string()], ..Default::default() },
    };
    let pipeline = build_pipeline(vec![t1]);

    let credentials = Credentials { bearer: Some("t1-key".to_string()), ..Default::default() };
    let result = pipeline
        .handle(
            &credentials,
            ToolCall { tool: "alpha:add".to_string(), arguments: json!({"a": 1, "b": 1}), idempotency_key: None },
        )
        .await
        .unwrap();
    assert_eq!(result, json!(2));
}
