//! The five built-in [`Authenticator`](super::Authenticator) kinds, plus the
//! composite that chains them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
use serde::Deserialize;

use super::{AuthMethod, Authenticator, Credentials, Principal};
use crate::mtls::CertIdentity;
use crate::{Error, Result};

/// Validates a single static shared-secret bearer token, generalized from
/// `gateway::auth::ResolvedAuthConfig`'s bearer-token check.
pub struct BearerTokenAuthenticator {
    token: String,
    principal_id: String,
}

impl BearerTokenAuthenticator {
    /// `token` is the shared secret; every caller presenting it is mapped to
    /// the same `principal_id` (there is only one bearer-token client).
    #[must_use]
    pub fn new(token: impl Into<String>, principal_id: impl Into<String>) -> Self {
        Self { token: token.into(), principal_id: principal_id.into() }
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    fn name(&self) -> &str {
        "bearer"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>> {
        let Some(token) = &credentials.bearer else { return Ok(None) };
        // Constant-time comparison: a timing leak here would let an attacker
        // recover the shared secret one byte at a time.
        use subtle::ConstantTimeEq;
        if token.as_bytes().ct_eq(self.token.as_bytes()).into() {
            Ok(Some(Principal {
                id: self.principal_id.clone(),
                tenant_id: None,
                roles: HashSet::new(),
                permissions: HashSet::new(),
                claims: HashMap::new(),
                method: AuthMethod::Bearer,
                issued_at: None,
                expires_at: None,
            }))
        } else {
            Ok(None)
        }
    }
}

/// One configured API key, generalized from `gateway::auth::ResolvedApiKey`
/// with roles/scopes/tenant added for the wider policy surface.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// The key value presented by the client.
    pub key: String,
    /// Stable principal id this key maps to.
    pub principal_id: String,
    /// Tenant this key belongs to, if tenancy is enabled.
    pub tenant_id: Option<String>,
    /// Roles granted to callers presenting this key.
    pub roles: HashSet<String>,
}

/// Looks a presented key up in a configured table.
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, ApiKeyRecord>,
}

impl ApiKeyAuthenticator {
    /// Build the lookup table from configured records.
    #[must_use]
    pub fn new(records: Vec<ApiKeyRecord>) -> Self {
        let keys = records.into_iter().map(|r| (r.key.clone(), r)).collect();
        Self { keys }
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    fn name(&self) -> &str {
        "api-key"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>> {
        let Some(token) = &credentials.bearer else { return Ok(None) };
        let Some(record) = self.keys.get(token) else { return Ok(None) };
        Ok(Some(Principal {
            id: record.principal_id.clone(),
            tenant_id: record.tenant_id.clone(),
            roles: record.roles.clone(),
            permissions: HashSet::new(),
            claims: HashMap::new(),
            method: AuthMethod::ApiKey,
            issued_at: None,
            expires_at: None,
        }))
    }
}

/// Claims extracted from a verified OIDC ID token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// `sub` claim.
    pub subject: String,
    /// `email` claim, empty when absent.
    pub email: String,
    /// Group memberships from a custom claim, when the provider sends one.
    pub groups: Vec<String>,
    /// `iss` claim.
    pub issuer: String,
}

/// Verifies an OIDC ID token's signature and standard claims, generalized
/// from `key_server::oidc`'s JWKS-backed verifier.
pub struct OidcAuthenticator {
    verifier: Arc<dyn OidcVerifier>,
}

/// Abstracts over `key_server::oidc`'s concrete JWKS-fetching verifier so
/// this authenticator can be unit-tested without network access.
#[async_trait]
pub trait OidcVerifier: Send + Sync {
    /// Verify a raw ID token JWT and return its claims.
    async fn verify(&self, id_token: &str) -> std::result::Result<VerifiedIdentity, String>;
}

impl OidcAuthenticator {
    /// Wrap a verifier (typically backed by `key_server::oidc::JwksCache`).
    #[must_use]
    pub fn new(verifier: Arc<dyn OidcVerifier>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl Authenticator for OidcAuthenticator {
    fn name(&self) -> &str {
        "oidc"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>> {
        let Some(token) = &credentials.bearer else { return Ok(None) };
        match self.verifier.verify(token).await {
            Ok(identity) => {
                let mut claims = HashMap::new();
                claims.insert("email".to_string(), identity.email.clone());
                claims.insert("issuer".to_string(), identity.issuer.clone());
                Ok(Some(Principal {
                    id: identity.subject,
                    tenant_id: None,
                    roles: identity.groups.into_iter().collect(),
                    permissions: HashSet::new(),
                    claims,
                    method: AuthMethod::Oidc,
                    issued_at: None,
                    expires_at: None,
                }))
            }
            // An OIDC token that fails verification is a hard rejection, not
            // a "try the next authenticator" case — unlike a missing bearer
            // header, a malformed/expired token is evidence of an attack or
            // misconfiguration and should not silently fall through.
            Err(msg) => Err(Error::Unauthenticated(msg)),
        }
    }
}

/// Maps a verified client certificate's identity fields to a principal,
/// generalized from `mtls::access_control`'s policy matching.
pub struct ClientCertAuthenticator {
    /// Organizational-unit -> role mapping, e.g. `"engineering" -> "admin"`.
    ou_roles: HashMap<String, HashSet<String>>,
}

impl ClientCertAuthenticator {
    /// `ou_roles` maps an OU value to the roles a caller with that OU holds.
    #[must_use]
    pub fn new(ou_roles: HashMap<String, HashSet<String>>) -> Self {
        Self { ou_roles }
    }
}

#[async_trait]
impl Authenticator for ClientCertAuthenticator {
    fn name(&self) -> &str {
        "client-cert"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>> {
        let Some(der) = &credentials.client_cert_der else { return Ok(None) };
        let identity = CertIdentity::from_der(der)
            .map_err(|e| Error::Unauthenticated(format!("invalid client certificate: {e}")))?;

        let roles = identity
            .organizational_unit
            .as_ref()
            .and_then(|ou| self.ou_roles.get(ou))
            .cloned()
            .unwrap_or_default();

        let mut claims = HashMap::new();
        if let Some(ou) = &identity.organizational_unit {
            claims.insert("ou".to_string(), ou.clone());
        }

        Ok(Some(Principal {
            id: identity.display_name,
            tenant_id: identity.organizational_unit,
            roles,
            permissions: HashSet::new(),
            claims,
            method: AuthMethod::ClientCert,
            issued_at: None,
            expires_at: None,
        }))
    }
}

/// An external RFC 7662 token-introspection endpoint.
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// Introspect an opaque token, returning the principal it maps to, or
    /// `None` when the endpoint reports the token as inactive.
    async fn introspect(&self, token: &str) -> Result<Option<Principal>>;
}

struct CachedIntrospection {
    principal: Option<Principal>,
    fetched_at: std::time::Instant,
}

/// Calls an external introspection endpoint, caching outcomes keyed by
/// token hash for `ttl` so repeated calls from the same caller within a
/// request burst do not each round-trip to the introspection service.
pub struct OpaqueTokenAuthenticator {
    introspector: Arc<dyn TokenIntrospector>,
    cache: DashMap<String, CachedIntrospection>,
    ttl: Duration,
}

impl OpaqueTokenAuthenticator {
    /// Wrap an introspection client with a local result cache.
    #[must_use]
    pub fn new(introspector: Arc<dyn TokenIntrospector>, ttl: Duration) -> Self {
        Self { introspector, cache: DashMap::new(), ttl }
    }

    fn token_hash(token: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl Authenticator for OpaqueTokenAuthenticator {
    fn name(&self) -> &str {
        "opaque-introspection"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>> {
        let Some(token) = &credentials.bearer else { return Ok(None) };
        let key = Self::token_hash(token);

        if let Some(cached) = self.cache.get(&key) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.principal.clone());
            }
        }

        let principal = self.introspector.introspect(token).await?;
        self.cache.insert(
            key,
            CachedIntrospection { principal: principal.clone(), fetched_at: std::time::Instant::now() },
        );
        Ok(principal)
    }
}

/// Calls an RFC 7662 token-introspection endpoint over HTTP, the concrete
/// [`TokenIntrospector`] [`OpaqueTokenAuthenticator`] wraps in production.
pub struct HttpTokenIntrospector {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTokenIntrospector {
    /// Point at an introspection endpoint (e.g. an OAuth authorization
    /// server's `/introspect`).
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::builder().https_only(true).build().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

#[async_trait]
impl TokenIntrospector for HttpTokenIntrospector {
    async fn introspect(&self, token: &str) -> Result<Option<Principal>> {
        let response: IntrospectionResponse = self
            .http
            .post(&self.endpoint)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("introspection request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("invalid introspection response: {e}")))?;

        if !response.active {
            return Ok(None);
        }

        let permissions = response
            .scope
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Some(Principal {
            id: response.sub.unwrap_or_else(|| "introspected".to_string()),
            tenant_id: None,
            roles: HashSet::new(),
            permissions,
            claims: HashMap::new(),
            method: AuthMethod::Opaque,
            issued_at: None,
            expires_at: response.exp,
        }))
    }
}

/// How a [`CompositeAuthenticator`] combines its children's outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// The first authenticator that returns `Some(principal)` wins; an
    /// authenticator returning `Ok(None)` is skipped, not treated as
    /// failure.
    StopFirst,
    /// Every authenticator that has an opinion (returns `Ok(Some(_))` or
    /// `Err`) must succeed; any hard failure rejects the whole request.
    /// Used when multiple credential kinds must simultaneously hold (e.g.
    /// mTLS plus an application-level bearer token).
    RequiredAll,
}

/// Tries each child authenticator in order, combining outcomes per `mode`.
/// Grounded on `provider::composite_provider`'s fan-out/fan-in pattern
/// applied to authentication instead of tool dispatch.
pub struct CompositeAuthenticator {
    children: Vec<Arc<dyn Authenticator>>,
    mode: CompositeMode,
}

impl CompositeAuthenticator {
    /// Build from an ordered list of child authenticators.
    #[must_use]
    pub fn new(children: Vec<Arc<dyn Authenticator>>, mode: CompositeMode) -> Self {
        Self { children, mode }
    }
}

#[async_trait]
impl Authenticator for CompositeAuthenticator {
    fn name(&self) -> &str {
        "composite"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Option<Principal>> {
        match self.mode {
            CompositeMode::StopFirst => {
                for child in &self.children {
                    if let Some(principal) = child.authenticate(credentials).await? {
                        return Ok(Some(principal));
                    }
                }
                Ok(None)
            }
            CompositeMode::RequiredAll => {
                let mut merged: Option<Principal> = None;
                for child in &self.children {
                    match child.authenticate(credentials).await? {
                        Some(principal) => {
                            merged = Some(match merged {
                                None => principal,
                                Some(mut acc) => {
                                    acc.roles.extend(principal.roles);
                                    acc.permissions.extend(principal.permissions);
                                    acc.claims.extend(principal.claims);
                                    acc
                                }
                            });
                        }
                        None => return Ok(None),
                    }
                }
                Ok(merged)
            }
        }
    }
}

/// Minimal OIDC provider registration: the issuer to accept tokens from and
/// the JWKS endpoint to fetch signing keys from.
#[derive(Debug, Clone)]
pub struct OidcProvider {
    /// Expected `iss` claim.
    pub issuer: String,
    /// JWKS endpoint; defaults to the OIDC discovery convention when `None`.
    pub jwks_uri: Option<String>,
    /// Accepted `aud` values; empty means any audience is accepted.
    pub audiences: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: String,
    sub: String,
    #[serde(default)]
    aud: serde_json::Value,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    groups: Option<Vec<String>>,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: std::time::Instant,
}

/// Verifies OIDC ID tokens against a fixed set of trusted issuers, caching
/// each issuer's JWKS for `ttl`. Grounded on `key_server::oidc::JwksCache`'s
/// fetch-cache-refresh-on-unknown-kid shape, generalized to a plain
/// authenticator instead of a token-exchange endpoint.
pub struct JwksOidcVerifier {
    providers: Vec<OidcProvider>,
    jwks_cache: DashMap<String, CachedJwks>,
    http: reqwest::Client,
    ttl: Duration,
}

impl JwksOidcVerifier {
    /// Trust only the given providers; JWKS responses are cached for `ttl`.
    #[must_use]
    pub fn new(providers: Vec<OidcProvider>, ttl: Duration) -> Self {
        Self {
            providers,
            jwks_cache: DashMap::new(),
            http: reqwest::Client::builder().https_only(true).build().unwrap_or_default(),
            ttl,
        }
    }

    fn unverified_claims(token: &str) -> std::result::Result<IdTokenClaims, String> {
        let parts: Vec<&str> = token.splitn(3, '.').collect();
        if parts.len() < 2 {
            return Err("malformed JWT".to_string());
        }
        let payload = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, parts[1])
            .map_err(|_| "invalid base64 payload".to_string())?;
        serde_json::from_slice(&payload).map_err(|_| "invalid claims payload".to_string())
    }

    async fn jwks_for(&self, issuer: &str, jwks_uri: &str, force: bool) -> std::result::Result<JwkSet, String> {
        if !force {
            if let Some(cached) = self.jwks_cache.get(issuer) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }
        let keys: JwkSet = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;
        self.jwks_cache.insert(
            issuer.to_string(),
            CachedJwks { keys: keys.clone(), fetched_at: std::time::Instant::now() },
        );
        Ok(keys)
    }

    fn decoding_key(jwks: &JwkSet, kid: &str) -> Option<DecodingKey> {
        jwks.keys
            .iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
            .and_then(|jwk| match &jwk.algorithm {
                AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok(),
                AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y).ok(),
                AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
            })
    }
}

#[async_trait]
impl OidcVerifier for JwksOidcVerifier {
    async fn verify(&self, id_token: &str) -> std::result::Result<VerifiedIdentity, String> {
        let claims = Self::unverified_claims(id_token)?;
        let provider = self
            .providers
            .iter()
            .find(|p| p.issuer == claims.iss)
            .ok_or_else(|| format!("unknown issuer: {}", claims.iss))?;

        let header = jsonwebtoken::decode_header(id_token).map_err(|e| e.to_string())?;
        let kid = header.kid.clone().ok_or("JWT missing kid")?;
        let jwks_uri = provider
            .jwks_uri
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", provider.issuer.trim_end_matches('/')));

        let mut jwks = self.jwks_for(&provider.issuer, &jwks_uri, false).await?;
        let mut key = Self::decoding_key(&jwks, &kid);
        if key.is_none() {
            jwks = self.jwks_for(&provider.issuer, &jwks_uri, true).await?;
            key = Self::decoding_key(&jwks, &kid);
        }
        let key = key.ok_or_else(|| format!("unknown key id: {kid}"))?;

        let alg = match header.alg {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 | Algorithm::ES256 | Algorithm::ES384 => {
                header.alg
            }
            _ => Algorithm::RS256,
        };
        let mut validation = Validation::new(alg);
        validation.leeway = 60;
        validation.validate_aud = false;

        let data: TokenData<IdTokenClaims> =
            jsonwebtoken::decode(id_token, &key, &validation).map_err(|e| e.to_string())?;
        let claims = data.claims;

        if !provider.audiences.is_empty() {
            let ok = match &claims.aud {
                serde_json::Value::String(s) => provider.audiences.iter().any(|a| a == s),
                serde_json::Value::Array(arr) => arr
                    .iter()
                    .any(|v| v.as_str().is_some_and(|s| provider.audiences.iter().any(|a| a == s))),
                _ => false,
            };
            if !ok {
                return Err("audience mismatch".to_string());
            }
        }

        Ok(VerifiedIdentity {
            subject: claims.sub,
            email: claims.email.unwrap_or_default(),
            groups: claims.groups.unwrap_or_default(),
            issuer: claims.iss,
        })
    }
}
