//! Configuration management

use std::{collections::HashMap, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::security::policy::ToolPolicyConfig;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `{env.VAR}` resolution.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Meta-MCP configuration
    pub meta_mcp: MetaMcpConfig,
    /// Streaming configuration (for real-time notifications)
    pub streaming: StreamingConfig,
    /// Failsafe configuration
    pub failsafe: FailsafeConfig,
    /// Backend configurations
    pub backends: HashMap<String, BackendConfig>,
    /// Capability configuration (direct REST API integration)
    pub capabilities: CapabilityConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Playbook configuration
    pub playbooks: PlaybooksConfig,
    /// Security policy configuration
    pub security: SecurityConfig,
    /// Identity/authentication configuration (C7)
    pub identity: IdentityConfig,
    /// Multi-tenancy configuration (C7)
    pub tenancy: TenancyConfig,
    /// Request pipeline configuration (C6)
    pub pipeline: PipelineConfig,
    /// Per-request/per-chain execution limits
    pub execution: ExecutionConfig,
}

/// Cache configuration for response caching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching
    pub enabled: bool,
    /// Default TTL for cached responses
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Maximum number of entries before eviction
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

/// Playbook configuration for multi-step tool chains
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybooksConfig {
    /// Enable playbook engine
    pub enabled: bool,
    /// Directories to load playbook definitions from
    pub directories: Vec<String>,
}

impl Default for PlaybooksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directories: vec!["playbooks".to_string()],
        }
    }
}

/// Security configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable input sanitization (null byte rejection, control char stripping, NFC)
    pub sanitize_input: bool,
    /// Enable SSRF protection for outbound URLs
    pub ssrf_protection: bool,
    /// Tool allow/deny policy
    pub tool_policy: ToolPolicyConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sanitize_input: true,
            ssrf_protection: true,
            tool_policy: ToolPolicyConfig::default(),
        }
    }
}

/// One trusted OIDC issuer the gateway will accept ID tokens from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcProviderConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// JWKS endpoint; defaults to the OIDC discovery convention when absent.
    pub jwks_uri: Option<String>,
    /// Accepted `aud` values; empty means any audience is accepted.
    pub audiences: Vec<String>,
}

impl Default for OidcProviderConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            jwks_uri: None,
            audiences: Vec::new(),
        }
    }
}

/// Client-certificate organizational-unit -> role mapping entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientCertRoleConfig {
    /// Certificate OU this entry matches.
    pub ou: String,
    /// Roles granted to callers presenting a certificate with this OU.
    pub roles: Vec<String>,
}

/// Role-based authorization configuration, consulted by
/// [`crate::identity::RoleBasedAuthorizer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleAuthorizationConfig {
    /// Tool name/prefix glob patterns denied outright, checked before allow.
    pub deny_patterns: Vec<String>,
    /// Tool name/prefix glob patterns allowed, checked after deny.
    pub allow_patterns: Vec<String>,
    /// Role -> additionally allowed tool patterns.
    pub role_allow: HashMap<String, Vec<String>>,
    /// Roles that bypass every check below.
    pub superuser_roles: Vec<String>,
}

impl Default for RoleAuthorizationConfig {
    fn default() -> Self {
        Self {
            deny_patterns: Vec::new(),
            allow_patterns: vec!["*".to_string()],
            role_allow: HashMap::new(),
            superuser_roles: Vec::new(),
        }
    }
}

/// Identity and authentication configuration (C7).
///
/// Mirrors [`AuthConfig`]'s shape for the simple bearer/api-key case while
/// adding the OIDC, client-cert, and opaque-introspection kinds
/// `identity::authenticator` supports. `auth` stays authoritative for the
/// legacy single-bearer-token deployments; `identity` layers the richer
/// credential kinds on top when `identity.enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Enable the richer identity pipeline (OIDC/client-cert/opaque).
    /// When `false`, only `auth.bearer_token`/`auth.api_keys` apply.
    pub enabled: bool,
    /// Allow anonymous principals when no credential is presented and no
    /// configured authenticator claims the request.
    pub allow_anonymous: bool,
    /// Trusted OIDC issuers.
    pub oidc_providers: Vec<OidcProviderConfig>,
    /// JWKS cache TTL.
    #[serde(with = "humantime_serde")]
    pub jwks_cache_ttl: Duration,
    /// Client-certificate OU -> role mappings.
    pub client_cert_roles: Vec<ClientCertRoleConfig>,
    /// Opaque-token introspection endpoint (RFC 7662). `None` disables the
    /// opaque-token authenticator.
    pub introspection_url: Option<String>,
    /// Introspection result cache TTL.
    #[serde(with = "humantime_serde")]
    pub introspection_cache_ttl: Duration,
    /// Role-based authorization rules.
    pub authorization: RoleAuthorizationConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_anonymous: true,
            oidc_providers: Vec::new(),
            jwks_cache_ttl: Duration::from_secs(3600),
            client_cert_roles: Vec::new(),
            introspection_url: None,
            introspection_cache_ttl: Duration::from_secs(60),
            authorization: RoleAuthorizationConfig::default(),
        }
    }
}

/// One configured tenant's access and resource policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenantConfigEntry {
    /// Stable tenant identifier, matched against `Principal::tenant_id`.
    pub id: String,
    /// Tool name/prefix patterns this tenant may invoke.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Tool name/prefix patterns this tenant may never invoke.
    #[serde(default)]
    pub denied_tools: Vec<String>,
    /// Requests per minute.
    #[serde(default = "default_tenant_rpm")]
    pub requests_per_minute: u32,
    /// Requests per day.
    #[serde(default = "default_tenant_rpd")]
    pub requests_per_day: u64,
    /// Maximum steps in a single `run_chain` invocation.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,
}

fn default_tenant_rpm() -> u32 {
    60
}

fn default_tenant_rpd() -> u64 {
    10_000
}

fn default_max_chain_depth() -> u32 {
    10
}

/// Multi-tenancy configuration (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Enable tenant resolution. When `false`, every request runs untenanted.
    pub enabled: bool,
    /// Tenant to fall back to when no claim or header resolves one.
    pub default_tenant: Option<String>,
    /// Statically configured tenants.
    pub tenants: Vec<TenantConfigEntry>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_tenant: None,
            tenants: Vec::new(),
        }
    }
}

/// Request pipeline configuration (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrent in-flight calls per `backend:tool` pair.
    pub bulkhead_max_concurrent: usize,
    /// How often the idempotency cache's background task sweeps stale
    /// entries.
    #[serde(with = "humantime_serde")]
    pub idempotency_sweep_interval: Duration,
    /// Enable idempotency-key deduplication for side-effecting tools.
    pub idempotency_enabled: bool,
    /// Per-(principal, tool) request budget enforced by the rate-limit
    /// pipeline stage, distinct from a tenant's daily/monthly quota.
    pub rate_limit_per_minute: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bulkhead_max_concurrent: 16,
            idempotency_sweep_interval: Duration::from_secs(300),
            idempotency_enabled: true,
            rate_limit_per_minute: 600,
        }
    }
}

/// Limits the pipeline enforces around the execution of a single tool
/// call or chain, independent of any one backend's own timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock deadline for a single `tools/call` dispatch, measured from
    /// the moment the pipeline hands off to the adapter. Exceeding it maps
    /// to `Error::BackendTimeout` rather than hanging the caller.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Maximum tool invocations a single `run_chain`/playbook execution may
    /// make, counting both named-playbook steps and ad-hoc steps.
    pub max_tool_calls: u32,
    /// Maximum steps accepted in a single `run_chain` ad-hoc step list,
    /// enforced as the default `max_steps` cap when the caller omits one.
    pub max_chain_steps: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_tool_calls: 50,
            max_chain_steps: 20,
        }
    }
}

/// Capability configuration for direct REST API integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    /// Enable capability system
    pub enabled: bool,
    /// Backend name for capabilities (shown in `gateway_list_servers`)
    pub name: String,
    /// Directories to load capability definitions from
    pub directories: Vec<String>,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "fulcrum".to_string(),
            directories: vec!["capabilities".to_string()],
        }
    }
}

/// Authentication configuration for gateway access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable authentication (default: false for backwards compatibility)
    pub enabled: bool,

    /// Bearer token for simple authentication
    /// Supports: literal value, `env:VAR_NAME`, or `auto` (generates random token)
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// API keys for multi-client access with optional restrictions
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,

    /// Paths that bypass authentication (default: `["/health"]`)
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bearer_token: None,
            api_keys: Vec::new(),
            public_paths: default_public_paths(),
        }
    }
}

impl AuthConfig {
    /// Resolve the bearer token (expand env vars, generate if `auto`)
    #[must_use]
    pub fn resolve_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_ref().map(|token| {
            if token == "auto" {
                // Generate a random token
                use rand::Rng;
                let random_bytes: [u8; 32] = rand::rng().random();
                format!(
                    "mcp_{}",
                    base64::Engine::encode(
                        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                        random_bytes
                    )
                )
            } else if let Some(var_name) = token.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| token.clone())
            } else {
                token.clone()
            }
        })
    }
}

/// API key configuration for multi-client access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// The API key value (supports `env:VAR_NAME`)
    pub key: String,

    /// Human-readable name for this client
    #[serde(default)]
    pub name: String,

    /// Rate limit (requests per minute, 0 = unlimited)
    #[serde(default)]
    pub rate_limit: u32,

    /// Allowed backends (empty = all backends)
    #[serde(default)]
    pub backends: Vec<String>,
}

impl ApiKeyConfig {
    /// Resolve the API key (expand env vars)
    #[must_use]
    pub fn resolve_key(&self) -> String {
        if let Some(var_name) = self.key.strip_prefix("env:") {
            env::var(var_name).unwrap_or_else(|_| self.key.clone())
        } else {
            self.key.clone()
        }
    }

    /// Check if this key has access to a backend
    #[must_use]
    pub fn can_access_backend(&self, backend: &str) -> bool {
        self.backends.is_empty() || self.backends.iter().any(|b| b == "*" || b == backend)
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (MCP_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("MCP_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in backend headers
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        // Expand in backend headers
        for backend in self.backends.values_mut() {
            for value in backend.headers.values_mut() {
                *value = Self::expand_string(&re, value);
            }
        }

        // Expand in capability directories
        for dir in &mut self.capabilities.directories {
            *dir = Self::expand_string(&re, dir);
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Get enabled backends only
    pub fn enabled_backends(&self) -> impl Iterator<Item = (&String, &BackendConfig)> {
        self.backends.iter().filter(|(_, b)| b.enabled)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Front-door transports to run concurrently: any of `http`, `stdio`.
    /// `http` serves both plain JSON-RPC request/response and the chunked
    /// SSE notification stream on the same listener; `stdio` speaks the
    /// same `Content-Length`-framed duplex the subprocess backend driver
    /// uses, letting the gateway itself be embedded as a subprocess.
    pub transports: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39400,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
            transports: vec!["http".to_string()],
        }
    }
}

/// Meta-MCP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaMcpConfig {
    /// Enable Meta-MCP mode
    pub enabled: bool,
    /// Cache tool lists
    pub cache_tools: bool,
    /// Tool cache TTL
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Backends to warm-start on gateway startup (pre-connect and cache tools)
    #[serde(default)]
    pub warm_start: Vec<String>,
}

impl Default for MetaMcpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_tools: true,
            cache_ttl: Duration::from_secs(300),
            warm_start: Vec::new(),
        }
    }
}

/// Streaming configuration (for real-time notifications)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Enable streaming (GET /mcp for notifications)
    pub enabled: bool,
    /// Notification buffer size per client
    pub buffer_size: usize,
    /// Keep-alive interval for SSE streams
    #[serde(with = "humantime_serde")]
    pub keep_alive_interval: Duration,
    /// Backends to auto-subscribe for notifications
    #[serde(default)]
    pub auto_subscribe: Vec<String>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 100,
            keep_alive_interval: Duration::from_secs(15),
            auto_subscribe: Vec::new(),
        }
    }
}

/// Failsafe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct FailsafeConfig {
    /// Circuit breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Health check configuration
    pub health_check: HealthCheckConfig,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaker
    pub enabled: bool,
    /// Failure threshold before opening
    pub failure_threshold: u32,
    /// Success threshold to close
    pub success_threshold: u32,
    /// Time to wait before half-open
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum retry attempts
    pub max_attempts: u32,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests per second per backend
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100,
            burst_size: 50,
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable health checks
    pub enabled: bool,
    /// Health check interval
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Health check timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Human-readable description
    pub description: String,
    /// Whether backend is enabled
    pub enabled: bool,
    /// Transport type
    #[serde(flatten)]
    pub transport: TransportConfig,
    /// Idle timeout before hibernation
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Request timeout for this backend
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Environment variables (for stdio)
    pub env: HashMap<String, String>,
    /// HTTP headers (for http/sse)
    pub headers: HashMap<String, String>,
    /// OAuth configuration (optional)
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
    /// How often to re-list this backend's tools and diff the result into
    /// the registry (`tool_added`/`tool_removed`/`tool_changed`).
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// Restart behavior for subprocess backends whose transport exits.
    #[serde(default)]
    pub restart_policy: RestartPolicyConfig,
    /// Routing priority among backends that advertise the same bare tool
    /// name (specification §3/§4.4: "priority descending, insertion
    /// order"). Higher values are preferred by `Registry::select_backend`.
    #[serde(default)]
    pub priority: i32,
}

/// Restart behavior applied to a subprocess backend whose child process
/// exits unexpectedly. Ignored for HTTP and local backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicyConfig {
    /// Whether to restart the subprocess at all.
    pub enabled: bool,
    /// Maximum consecutive restart attempts before giving up and leaving
    /// the backend `stopped`.
    pub max_restarts: u32,
    /// Delay before the first restart attempt; doubles on each consecutive
    /// failure up to `max_backoff`.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
    /// Ceiling on the doubling backoff delay.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RestartPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_restarts: 5,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// OAuth configuration for a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Enable OAuth for this backend
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OAuth scopes to request (if empty, uses server's supported scopes)
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Client ID (optional - uses dynamic registration or generates one if not set)
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            enabled: true,
            transport: TransportConfig::default(),
            idle_timeout: Duration::from_secs(300),
            timeout: Duration::from_secs(30),
            env: HashMap::new(),
            headers: HashMap::new(),
            oauth: None,
            refresh_interval: Duration::from_secs(60),
            restart_policy: RestartPolicyConfig::default(),
            priority: 0,
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransportConfig {
    /// Stdio transport (subprocess)
    Stdio {
        /// Command to execute
        command: String,
        /// Working directory
        #[serde(default)]
        cwd: Option<String>,
    },
    /// HTTP transport
    Http {
        /// HTTP URL
        http_url: String,
        /// Use Streamable HTTP (direct POST, no SSE handshake)
        /// Default is false (use SSE handshake)
        #[serde(default)]
        streamable_http: bool,
        /// Override protocol version (for servers that only support older versions)
        #[serde(default)]
        protocol_version: Option<String>,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Http {
            http_url: String::new(),
            streamable_http: false,
            protocol_version: None,
        }
    }
}

impl TransportConfig {
    /// Get transport type name
    #[must_use]
    pub fn transport_type(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http {
                http_url,
                streamable_http: false,
                ..
            } if http_url.ends_with("/sse") => "sse",
            Self::Http {
                streamable_http: true,
                ..
            } => "streamable-http",
            Self::Http { .. } => "http",
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        // Parse "30s", "5m", etc.
        if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "MCP_GW_TEST_KEY_A=hello_from_env_file").unwrap();
        writeln!(f, "MCP_GW_TEST_KEY_B=42").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("MCP_GW_TEST_KEY_A").unwrap(), "hello_from_env_file");
        assert_eq!(env::var("MCP_GW_TEST_KEY_B").unwrap(), "42");

        // Note: env::remove_var is unsafe in edition 2024 and lib forbids unsafe.
        // Test keys use unique MCP_GW_TEST_ prefix so won't conflict.
    }

    #[test]
    fn test_load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        // Should not panic
        config.load_env_files();
    }

    #[test]
    fn test_load_env_files_empty() {
        let config = Config::default();
        assert!(config.env_files.is_empty());
        config.load_env_files(); // No-op, should not panic
    }

    #[test]
    fn test_env_files_deserialized_from_yaml() {
        let yaml = r#"
env_files:
  - ~/.claude/secrets.env
  - /tmp/extra.env
server:
  host: "127.0.0.1"
  port: 39401
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.env_files.len(), 2);
        assert_eq!(config.env_files[0], "~/.claude/secrets.env");
    }
}
