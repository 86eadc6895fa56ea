//! Identity, tenancy, and authorization (C7).
//!
//! A request arrives with, at most, a bag of untrusted credentials (a
//! header, a bearer token, a peer certificate). This module turns that into
//! a [`Principal`] the rest of the pipeline can trust, resolves which
//! [`TenantContext`] the principal belongs to, and decides whether the
//! principal may invoke the tool it asked for.
//!
//! Every type here is request-scoped: a `Principal` is minted by an
//! [`Authenticator`] at ingress and dropped when the request completes, the
//! same lifecycle `gateway::auth::AuthenticatedClient` had, generalized to
//! five credential kinds instead of one.

mod authenticator;
mod authorizer;
mod quota;
mod tenant;

pub use authenticator::{
    ApiKeyAuthenticator, ApiKeyRecord, BearerTokenAuthenticator, ClientCertAuthenticator,
    CompositeAuthenticator, CompositeMode, HttpTokenIntrospector, JwksOidcVerifier,
    OidcAuthenticator, OidcProvider, OidcVerifier, OpaqueTokenAuthenticator, TokenIntrospector,
    VerifiedIdentity,
};
pub use authorizer::{
    AuthorizationRequest, Authorizer, ExternalPolicyAuthorizer, PolicyEngine, RoleBasedAuthorizer,
};
pub use quota::{QuotaDecision, QuotaStore, RetryBudget};
pub use tenant::{InMemoryTenantStore, TenantContext, TenantPolicy, TenantResolver, TenantStore, TenantTier};

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Which authenticator kind minted a [`Principal`], kept for audit events
/// and per-authenticator metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Static shared-secret bearer token.
    Bearer,
    /// Per-client API key.
    ApiKey,
    /// OIDC ID token, signature-verified against a JWKS.
    Oidc,
    /// mTLS client certificate subject.
    ClientCert,
    /// RFC 7662-style opaque token introspection.
    Opaque,
    /// No credential presented; only valid when anonymous access is enabled.
    Anonymous,
}

/// A successfully authenticated caller, scoped to a single request.
///
/// Never shared across requests and never persisted: the registry, cache,
/// and quota store only ever see the derived `principal_id`/`tenant_id`
/// strings a `Principal` carries, never the `Principal` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier for this caller (subject, CN, or api-key name).
    pub id: String,
    /// Tenant this principal was resolved under, if tenancy is enabled.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Role labels, consulted by [`RoleBasedAuthorizer`].
    #[serde(default)]
    pub roles: HashSet<String>,
    /// Fine-grained permission labels, consulted by `PolicyEngine` adapters.
    #[serde(default)]
    pub permissions: HashSet<String>,
    /// Arbitrary claims carried by the credential (OIDC claims, cert SANs).
    #[serde(default)]
    pub claims: HashMap<String, String>,
    /// Which authenticator produced this principal.
    pub method: AuthMethod,
    /// Epoch seconds the credential was issued, when the credential kind
    /// carries one (OIDC `iat`); `None` for static secrets.
    #[serde(default)]
    pub issued_at: Option<u64>,
    /// Epoch seconds the credential expires, when the credential kind
    /// carries one; `None` for static secrets that never expire.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl Principal {
    /// Build an anonymous principal for when anonymous access is enabled
    /// and no credential was presented.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_string(),
            tenant_id: None,
            roles: HashSet::new(),
            permissions: HashSet::new(),
            claims: HashMap::new(),
            method: AuthMethod::Anonymous,
            issued_at: None,
            expires_at: None,
        }
    }

    /// Whether the credential behind this principal has expired, per its
    /// own `expires_at` (static secrets with no expiry never do).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => now_secs() >= exp,
            None => false,
        }
    }

    /// Whether this principal holds every one of `scopes`, checked by the
    /// authorization stage against a tool's `required_scopes`.
    #[must_use]
    pub fn has_scopes(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|s| self.permissions.contains(s) || self.roles.contains(s))
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Untrusted credential material extracted from a transport request, before
/// any authenticator has validated it.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Raw bearer token from an `Authorization: Bearer <token>` header.
    pub bearer: Option<String>,
    /// DER-encoded peer certificate, when the transport terminated mTLS.
    pub client_cert_der: Option<Vec<u8>>,
    /// A tenant hint carried in a header, used when no claim/key resolves one.
    pub tenant_header: Option<String>,
}

/// Verifies one kind of credential and mints a [`Principal`].
///
/// Every authenticator kind in the specification — bearer, api-key, OIDC,
/// client-cert, opaque-token-introspection — implements this one trait, the
/// same closed-union shape `adapter::Adapter` uses for tool sources.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Human-readable name for logs and the composite authenticator's trace.
    fn name(&self) -> &str;

    /// Attempt to authenticate `credentials`. Returns `Ok(None)` when this
    /// authenticator has no opinion (e.g. no bearer token present for a
    /// bearer authenticator) rather than `Unauthenticated`, so a composite
    /// authenticator can fall through to the next kind.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>>;
}
