//! Tenant resolution and per-tenant policy.
//!
//! A tenant groups principals under a shared quota, tool allow/deny surface,
//! and chain-depth limit. Resolution order mirrors credential resolution
//! order elsewhere in this module: the most specific signal wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

use super::{Credentials, Principal};

/// Service tier a tenant is provisioned at, consulted by the quota stage for
/// its default request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    /// No request budget beyond global rate limiting.
    Free,
    /// Standard paid tier.
    Standard,
    /// Negotiated limits, generally much higher than `Standard`.
    Enterprise,
}

/// Per-tenant access and resource policy.
#[derive(Debug, Clone)]
pub struct TenantPolicy {
    /// Tool name/prefix patterns this tenant may invoke; empty means no
    /// restriction beyond the global authorizer.
    pub allowed_tools: Vec<String>,
    /// Tool name/prefix patterns this tenant may never invoke, checked
    /// before `allowed_tools`.
    pub denied_tools: Vec<String>,
    /// Maximum requests per minute, enforced by the quota stage.
    pub requests_per_minute: u32,
    /// Maximum requests per day.
    pub requests_per_day: u64,
    /// Maximum steps in a single `run_chain` invocation.
    pub max_chain_depth: u32,
    /// Service tier, used for defaulting limits when not explicitly set.
    pub tier: TenantTier,
}

impl Default for TenantPolicy {
    fn default() -> Self {
        Self {
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
            requests_per_minute: 60,
            requests_per_day: 10_000,
            max_chain_depth: 10,
            tier: TenantTier::Standard,
        }
    }
}

impl TenantPolicy {
    fn matches(tool: &str, patterns: &[String]) -> bool {
        patterns.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => tool.starts_with(prefix),
            None => tool == p,
        })
    }

    /// Whether `tool` is permitted under this tenant's policy.
    #[must_use]
    pub fn permits(&self, tool: &str) -> bool {
        if Self::matches(tool, &self.denied_tools) {
            return false;
        }
        self.allowed_tools.is_empty() || Self::matches(tool, &self.allowed_tools)
    }
}

/// A resolved tenant, carried alongside the [`Principal`] through the rest
/// of the pipeline.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Stable tenant identifier.
    pub id: String,
    /// This tenant's access and resource policy.
    pub policy: TenantPolicy,
}

/// Persists and looks up tenant policy, the tenant-resolution equivalent of
/// `docstore::Store`'s record lookup.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Fetch a tenant's context by id, `None` if the tenant is unknown.
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantContext>>;
}

/// An in-memory tenant store backed by a fixed configured table. Production
/// deployments needing dynamic tenant provisioning implement [`TenantStore`]
/// against their own persistence layer; this is the default.
pub struct InMemoryTenantStore {
    tenants: HashMap<String, TenantContext>,
}

impl InMemoryTenantStore {
    /// Build from a fixed table of tenants.
    #[must_use]
    pub fn new(tenants: Vec<TenantContext>) -> Self {
        Self { tenants: tenants.into_iter().map(|t| (t.id.clone(), t)).collect() }
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantContext>> {
        Ok(self.tenants.get(tenant_id).cloned())
    }
}

/// Resolves which tenant a request belongs to.
///
/// Resolution order: a claim already carried by the principal (set by an
/// OIDC or API-key authenticator), then a tenant header on the request,
/// then a configured default tenant. Silence (no match at any step) is not
/// an error; tenancy is optional.
pub struct TenantResolver {
    store: Arc<dyn TenantStore>,
    default_tenant_id: Option<String>,
}

impl TenantResolver {
    /// Build a resolver against a tenant store, with an optional fallback
    /// tenant for deployments that want a single shared tenant by default.
    #[must_use]
    pub fn new(store: Arc<dyn TenantStore>, default_tenant_id: Option<String>) -> Self {
        Self { store, default_tenant_id }
    }

    /// Resolve the tenant for a principal and its raw credentials.
    pub async fn resolve(
        &self,
        principal: &Principal,
        credentials: &Credentials,
    ) -> Result<Option<TenantContext>> {
        if let Some(tenant_id) = &principal.tenant_id {
            if let Some(ctx) = self.store.get(tenant_id).await? {
                return Ok(Some(ctx));
            }
            return Err(Error::Unauthenticated(format!("unknown tenant: {tenant_id}")));
        }

        if let Some(tenant_id) = &credentials.tenant_header {
            if let Some(ctx) = self.store.get(tenant_id).await? {
                return Ok(Some(ctx));
            }
            return Err(Error::Unauthenticated(format!("unknown tenant: {tenant_id}")));
        }

        if let Some(tenant_id) = &self.default_tenant_id {
            return self.store.get(tenant_id).await;
        }

        Ok(None)
    }
}
