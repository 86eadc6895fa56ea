//! The gateway composition root: wires every module into a running server.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::adapter::{Adapter, CapabilityAdapter, LocalAdapter, McpAdapter};
use crate::backend::{Backend, BackendRegistry};
use crate::cache::ResponseCache;
use crate::canonical::CanonicalTool;
use crate::capability::{CapabilityBackend, CapabilityExecutor};
use crate::config::Config;
use crate::docstore::{SharedStore, Store};
use crate::failsafe::Bulkhead;
use crate::identity::{
    ApiKeyAuthenticator, ApiKeyRecord, BearerTokenAuthenticator, ClientCertAuthenticator,
    CompositeAuthenticator, CompositeMode, HttpTokenIntrospector, InMemoryTenantStore,
    JwksOidcVerifier, OidcAuthenticator, OidcProvider, OpaqueTokenAuthenticator, QuotaStore,
    RoleBasedAuthorizer, TenantContext, TenantPolicy, TenantResolver, TenantTier,
};
use crate::idempotency;
use crate::pipeline::{Dispatcher, Pipeline, PipelineGuards};
use crate::playbook::PlaybookEngine;
use crate::providers::{BuiltinProviders, CodeSandbox, ProcessSandbox, ToolDispatcher};
use crate::registry::{Registry, RegistryEvent, SharedRegistry};
use crate::security::policy::ToolPolicy;
use crate::{
    Result,
    gateway::{router, rpc::RpcHandler, stdio_front, streaming::NotificationMultiplexer},
};

/// The assembled, runnable gateway.
pub struct Gateway {
    config: Config,
    registry: SharedRegistry,
    docstore: SharedStore,
    backend_registry: Arc<BackendRegistry>,
    rpc: Arc<RpcHandler>,
    multiplexer: Arc<NotificationMultiplexer>,
}

impl Gateway {
    /// Build every subsystem and register every configured tool source.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured capability or playbook directory
    /// cannot be loaded.
    pub async fn new(config: Config) -> Result<Self> {
        let registry: SharedRegistry = Arc::new(Registry::new());
        let docstore: SharedStore = Arc::new(Store::new());
        let cache = Arc::new(ResponseCache::new());
        let bulkhead = Arc::new(Bulkhead::new(
            NonZeroUsize::new(config.pipeline.bulkhead_max_concurrent).unwrap_or(NonZeroUsize::MIN),
        ));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), cache, bulkhead));

        let backend_registry = Arc::new(BackendRegistry::new());
        dispatcher.set_health_view(backend_registry.clone());
        for (name, backend_config) in config.enabled_backends() {
            let backend = Arc::new(Backend::new(
                name,
                backend_config.clone(),
                &config.failsafe,
                config.meta_mcp.cache_ttl,
            ));
            backend_registry.register(backend.clone());
            tokio::spawn(Arc::clone(&backend).supervise());

            let adapter: Arc<dyn Adapter> = Arc::new(McpAdapter::new(backend));
            dispatcher.register_adapter(name.clone(), adapter.clone());
            register_adapter_tools(&registry, &docstore, adapter.as_ref(), backend_config.priority).await;
            spawn_refresh_task(
                registry.clone(),
                name.clone(),
                adapter.clone(),
                backend_config.refresh_interval,
                backend_config.priority,
            );
        }

        if config.capabilities.enabled {
            let executor = Arc::new(CapabilityExecutor::new());
            let mut capability_backend =
                CapabilityBackend::new(&config.capabilities.name, executor);
            for dir in &config.capabilities.directories {
                match capability_backend.load_from_directory(dir).await {
                    Ok(count) => info!(dir, count, "loaded capability definitions"),
                    Err(e) => warn!(dir, error = %e, "failed to load capability directory"),
                }
            }
            let adapter: Arc<dyn Adapter> = Arc::new(CapabilityAdapter::new(capability_backend));
            dispatcher.register_adapter(config.capabilities.name.clone(), adapter.clone());
            register_adapter_tools(&registry, &docstore, adapter.as_ref(), 0).await;
        }

        let mut chains = PlaybookEngine::new();
        if config.playbooks.enabled {
            for dir in &config.playbooks.directories {
                match chains.load_from_directory(dir) {
                    Ok(count) => info!(dir, count, "loaded playbook definitions"),
                    Err(e) => warn!(dir, error = %e, "failed to load playbook directory"),
                }
            }
        }

        let sandbox: Arc<dyn CodeSandbox> = Arc::new(ProcessSandbox::default());
        let builtin_providers = Arc::new(BuiltinProviders::new(
            registry.clone(),
            docstore.clone(),
            chains,
            sandbox,
            dispatcher.clone() as Arc<dyn ToolDispatcher>,
            config.execution.max_chain_steps as usize,
        ));
        let local_adapter: Arc<dyn Adapter> = Arc::new(LocalAdapter::new(builtin_providers));
        dispatcher.register_adapter(crate::adapter::LOCAL_BACKEND_NAME, local_adapter.clone());
        register_adapter_tools(&registry, &docstore, local_adapter.as_ref(), 0).await;

        let guards = build_guards(&config);
        let pipeline = Arc::new(Pipeline::new(registry.clone(), dispatcher, guards));

        let multiplexer = Arc::new(NotificationMultiplexer::new(
            backend_registry.clone(),
            config.streaming.clone(),
        ));

        spawn_docstore_sync(registry.clone(), docstore.clone());
        idempotency::spawn_cleanup_task(
            pipeline.idempotency_cache(),
            config.pipeline.idempotency_sweep_interval,
        );

        let rpc = Arc::new(RpcHandler::new(pipeline, registry.clone(), config.meta_mcp.enabled));

        Ok(Self {
            config,
            registry,
            docstore,
            backend_registry,
            rpc,
            multiplexer,
        })
    }

    /// Serve every configured front-door transport concurrently until
    /// shutdown is requested, then drain backends.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured transport's listener cannot be
    /// bound, or if the HTTP transport exits with a server error.
    pub async fn run(self) -> Result<()> {
        let shutdown_timeout = self.config.server.shutdown_timeout;
        let backend_registry = self.backend_registry.clone();

        let mut stdio_handle = None;
        if self.config.server.transports.iter().any(|t| t == "stdio") {
            info!("stdio front door enabled");
            let rpc = self.rpc.clone();
            stdio_handle = Some(tokio::spawn(async move {
                stdio_front::serve(rpc).await;
            }));
        }

        if self.config.server.transports.iter().any(|t| t == "http") {
            let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| crate::Error::Config(format!("failed to bind {addr}: {e}")))?;
            info!(%addr, "MCP Gateway listening");

            let app = router::build_router(
                self.rpc.clone(),
                self.multiplexer.clone(),
                self.registry.clone(),
                self.docstore.clone(),
                &self.config,
            );

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| crate::Error::Internal(format!("server error: {e}")))?;
        } else if let Some(handle) = stdio_handle {
            // stdio-only deployment: the stdio task itself owns the
            // process lifetime (it exits on stdin EOF).
            let _ = handle.await;
        } else {
            shutdown_signal().await;
        }

        info!(?shutdown_timeout, "draining backends");
        backend_registry.stop_all().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn register_adapter_tools(
    registry: &SharedRegistry,
    docstore: &SharedStore,
    adapter: &dyn Adapter,
    priority: i32,
) {
    match adapter.list_tools().await {
        Ok(tools) => {
            for tool in tools {
                register_tool(registry, docstore, tool, priority);
            }
        }
        Err(e) => warn!(adapter = adapter.name(), error = %e, "failed to list tools"),
    }
}

fn register_tool(registry: &SharedRegistry, docstore: &SharedStore, tool: CanonicalTool, priority: i32) {
    docstore.upsert(&tool);
    registry.register_with_priority(tool, priority);
}

/// Mirrors registry change events into the documentation store so
/// `describe_tool` never serves stale or missing documentation.
fn spawn_docstore_sync(registry: SharedRegistry, docstore: SharedStore) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::Registered { id, backend }
                | RegistryEvent::Shadowed { id, backend, .. }
                | RegistryEvent::Changed { id, backend }) => {
                    let qualified = format!("{backend}:{id}");
                    if let Some(entry) = registry.resolve(&qualified) {
                        docstore.upsert(&entry.tool);
                    }
                }
                Ok(RegistryEvent::Deregistered { id, backend }) => {
                    docstore.remove(&format!("{backend}:{id}"));
                }
                Ok(RegistryEvent::Rejected { id, backend, reason }) => {
                    warn!(tool = %id, %backend, %reason, "tool rejected, not added to docstore");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "docstore sync lagged behind registry events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Periodically re-list `adapter`'s tools and diff them into the registry
/// (C4 "Tool refresh"), surfacing `tool_added`/`tool_removed`/`tool_changed`
/// as [`RegistryEvent`]s. A listing failure is logged and skipped; it does
/// not mark the backend unhealthy by itself (that is the circuit breaker's
/// job, driven by actual call failures).
fn spawn_refresh_task(
    registry: SharedRegistry,
    backend_name: String,
    adapter: Arc<dyn Adapter>,
    interval: std::time::Duration,
    priority: i32,
) {
    if interval.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it, initial list already ran
        loop {
            ticker.tick().await;
            match adapter.list_tools().await {
                Ok(tools) => registry.refresh_backend_with_priority(&backend_name, tools, priority),
                Err(e) => warn!(backend = %backend_name, error = %e, "periodic tool refresh failed"),
            }
        }
    });
}

fn build_guards(config: &Config) -> PipelineGuards {
    let mut children: Vec<Arc<dyn crate::identity::Authenticator>> = Vec::new();

    if let Some(token) = config.auth.resolve_bearer_token() {
        children.push(Arc::new(BearerTokenAuthenticator::new(token, "bearer-client")));
    }

    if !config.auth.api_keys.is_empty() {
        let records = config
            .auth
            .api_keys
            .iter()
            .map(|k| ApiKeyRecord {
                key: k.resolve_key(),
                principal_id: if k.name.is_empty() { k.resolve_key() } else { k.name.clone() },
                tenant_id: None,
                roles: HashSet::new(),
            })
            .collect();
        children.push(Arc::new(ApiKeyAuthenticator::new(records)));
    }

    if config.identity.enabled {
        if !config.identity.oidc_providers.is_empty() {
            let providers = config
                .identity
                .oidc_providers
                .iter()
                .map(|p| OidcProvider {
                    issuer: p.issuer.clone(),
                    jwks_uri: p.jwks_uri.clone(),
                    audiences: p.audiences.clone(),
                })
                .collect();
            let verifier = Arc::new(JwksOidcVerifier::new(providers, config.identity.jwks_cache_ttl));
            children.push(Arc::new(OidcAuthenticator::new(verifier)));
        }

        if !config.identity.client_cert_roles.is_empty() {
            let ou_roles = config
                .identity
                .client_cert_roles
                .iter()
                .map(|entry| (entry.ou.clone(), entry.roles.iter().cloned().collect::<HashSet<_>>()))
                .collect();
            children.push(Arc::new(ClientCertAuthenticator::new(ou_roles)));
        }

        if let Some(url) = &config.identity.introspection_url {
            let introspector = Arc::new(HttpTokenIntrospector::new(url.clone()));
            children.push(Arc::new(OpaqueTokenAuthenticator::new(
                introspector,
                config.identity.introspection_cache_ttl,
            )));
        }
    }

    let authenticator: Arc<dyn crate::identity::Authenticator> =
        Arc::new(CompositeAuthenticator::new(children, CompositeMode::StopFirst));

    let superuser_roles: HashSet<String> = config.identity.authorization.superuser_roles.iter().cloned().collect();
    let authorizer = Arc::new(RoleBasedAuthorizer::new(
        config.identity.authorization.deny_patterns.clone(),
        config.identity.authorization.allow_patterns.clone(),
        config.identity.authorization.role_allow.clone(),
        superuser_roles,
    ));

    let tenant_resolver = if config.tenancy.enabled {
        let tenants = config
            .tenancy
            .tenants
            .iter()
            .map(|t| TenantContext {
                id: t.id.clone(),
                policy: TenantPolicy {
                    allowed_tools: t.allowed_tools.clone(),
                    denied_tools: t.denied_tools.clone(),
                    requests_per_minute: t.requests_per_minute,
                    requests_per_day: t.requests_per_day,
                    max_chain_depth: t.max_chain_depth,
                    tier: TenantTier::Standard,
                },
            })
            .collect();
        let store = Arc::new(InMemoryTenantStore::new(tenants));
        Some(Arc::new(TenantResolver::new(store, config.tenancy.default_tenant.clone())))
    } else {
        None
    };

    PipelineGuards {
        authenticator,
        tenant_resolver,
        authorizer,
        tool_policy: ToolPolicy::from_config(&config.security.tool_policy),
        quota: Arc::new(QuotaStore::new()),
        rate_limiter: Arc::new(crate::failsafe::KeyedRateLimiter::new(config.pipeline.rate_limit_per_minute)),
        sanitize_input: config.security.sanitize_input,
        idempotency_enabled: config.pipeline.idempotency_enabled,
        dispatch_timeout: config.execution.timeout,
    }
}
