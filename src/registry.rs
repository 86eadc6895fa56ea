//! The tool registry: namespacing, collision handling, health-aware backend
//! selection, and search.
//!
//! Every [`CanonicalTool`] discovered by an adapter is registered here under
//! its bare name and its backend-qualified name. Bare-name collisions are no
//! longer resolved purely by arrival order: each bare name keeps an ordered
//! list of [`BackendRoute`]s, sorted by descending priority and then by
//! registration order, and [`Registry::select_backend`] walks that list
//! skipping any backend a [`HealthView`] reports unhealthy. The
//! highest-priority, oldest-registered, *healthy* route wins; when every
//! route is unhealthy, selection returns `None` rather than handing back a
//! tool the caller cannot reach (the registry's half of "never expose a tool
//! for an unhealthy backend at selection time"). Registration and
//! deregistration broadcast [`RegistryEvent`]s so the pipeline's cache stage
//! can invalidate stale entries and the docstore can evict stale
//! documentation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::canonical::CanonicalTool;

/// A tool plus the order it was registered in, used to resolve bare-name
/// collisions (oldest registration keeps the bare name, subject to
/// priority).
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// The canonical tool record.
    pub tool: CanonicalTool,
    /// Monotonic registration sequence number.
    pub registered_at: u64,
}

/// One backend's route to a bare tool name, used by
/// [`Registry::select_backend`] to pick among redundant registrations.
#[derive(Debug, Clone)]
struct BackendRoute {
    /// The `backend:tool` id this route resolves to.
    qualified_id: String,
    /// Registration sequence number, the tie-breaker below priority.
    registered_at: u64,
    /// Routing priority (specification §4.4: "priority descending, then
    /// insertion order"). Higher values are tried first.
    priority: i32,
}

/// Read-only view of backend health the registry consults at selection time.
/// Implemented by [`crate::backend::BackendRegistry`] so this module never
/// needs to depend on the backend module.
pub trait HealthView: Send + Sync {
    /// Whether `backend` is currently able to serve requests. An unknown
    /// backend name (one the health view has never heard of, such as the
    /// `local` pseudo-backend or a capability backend with no health
    /// tracking) is reported healthy so non-MCP origins are never
    /// erroneously excluded from selection.
    fn is_healthy(&self, backend: &str) -> bool;
}

/// A [`HealthView`] that reports every backend healthy, for callers (tests,
/// or origins with no health tracker at all) that don't need selection to
/// filter on health.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysHealthy;

impl HealthView for AlwaysHealthy {
    fn is_healthy(&self, _backend: &str) -> bool {
        true
    }
}

/// Events emitted as the registry's contents change.
#[derive(Debug, Clone, Serialize)]
pub enum RegistryEvent {
    /// A tool became newly addressable by its bare name.
    Registered {
        /// Bare tool name.
        id: String,
        /// Owning backend.
        backend: String,
    },
    /// A tool's bare name was taken by a higher-priority or earlier
    /// registration; it remains reachable only via its backend-qualified id.
    Shadowed {
        /// Bare tool name.
        id: String,
        /// Backend whose registration lost the bare name.
        backend: String,
        /// Backend that already holds the bare name.
        shadowed_by: String,
    },
    /// A tool was removed (backend stopped or was deregistered).
    Deregistered {
        /// Bare tool name.
        id: String,
        /// Owning backend.
        backend: String,
    },
    /// A previously-registered tool's schema, description, or scopes
    /// changed on a periodic backend refresh (C4 `tool_changed`). The bare
    /// name and qualification are unaffected; only the content differs.
    Changed {
        /// Bare tool name.
        id: String,
        /// Owning backend.
        backend: String,
    },
    /// A tool failed its data-model invariants (see
    /// [`CanonicalTool::validate`](crate::canonical::CanonicalTool::validate))
    /// and was never registered. The owning backend is not marked unhealthy
    /// for this alone; a malformed tool declaration among otherwise-good
    /// ones does not indicate the backend itself is failing.
    Rejected {
        /// Bare tool name as declared (may itself be invalid).
        id: String,
        /// Owning backend.
        backend: String,
        /// Why validation failed.
        reason: String,
    },
}

/// Pluggable tool search strategy used by the `search_tools` provider.
///
/// The default implementation is a case-insensitive substring scan over
/// name, summary, and description, the same idiom the donor repo's
/// community-capability index used for its own search.
pub trait Selector: Send + Sync {
    /// Rank and filter `candidates` against `query`, most relevant first.
    fn search<'a>(&self, query: &str, candidates: Vec<&'a RegistryEntry>) -> Vec<&'a RegistryEntry>;
}

/// Case-insensitive substring search over tool name/summary/description.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringSelector;

impl Selector for SubstringSelector {
    fn search<'a>(&self, query: &str, candidates: Vec<&'a RegistryEntry>) -> Vec<&'a RegistryEntry> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|entry| {
                let tool = &entry.tool;
                tool.id.as_str().to_lowercase().contains(&needle)
                    || tool.summary.to_lowercase().contains(&needle)
                    || tool.description.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

/// Sort a bare name's routes by descending priority, then ascending
/// registration order, in place.
fn sort_routes(routes: &mut Vec<BackendRoute>) {
    routes.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.registered_at.cmp(&b.registered_at)));
}

/// Concurrent tool registry shared by every pipeline request.
pub struct Registry {
    /// Bare name -> winning qualified id (the entry addressable without
    /// backend qualification, ignoring health).
    bare_names: DashMap<String, String>,
    /// Bare name -> every backend's route to it, priority- and
    /// registration-ordered, consulted by `select_backend`.
    routes: DashMap<String, Vec<BackendRoute>>,
    /// Qualified id (`backend:tool`) -> entry. Every registered tool is
    /// always reachable here, shadowed or not.
    by_qualified: DashMap<String, RegistryEntry>,
    /// Monotonic counter backing `registered_at`.
    sequence: std::sync::atomic::AtomicU64,
    events: broadcast::Sender<RegistryEvent>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            bare_names: DashMap::new(),
            routes: DashMap::new(),
            by_qualified: DashMap::new(),
            sequence: std::sync::atomic::AtomicU64::new(0),
            events: tx,
        }
    }

    /// Subscribe to registry change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register a tool at the default priority (0), resolving bare-name
    /// collisions by registration order.
    ///
    /// A tool failing [`CanonicalTool::validate`] is never inserted; a
    /// [`RegistryEvent::Rejected`] event fires instead and the call returns
    /// without touching either map.
    pub fn register(&self, tool: CanonicalTool) {
        self.register_with_priority(tool, 0);
    }

    /// Register a tool with an explicit routing `priority` (specification
    /// §4.4), typically sourced from the owning backend's configured
    /// `priority`. Higher priority wins the bare name over lower-priority or
    /// later-registered competitors; ties break by registration order.
    pub fn register_with_priority(&self, tool: CanonicalTool, priority: i32) {
        let bare = tool.id.as_str().to_string();
        let backend = tool.origin.backend_name().to_string();

        if let Err(reason) = tool.validate() {
            debug!(tool = %bare, backend = %backend, %reason, "rejected invalid tool");
            let _ = self.events.send(RegistryEvent::Rejected { id: bare, backend, reason });
            return;
        }

        let qualified = tool.qualified_id();
        let seq = self.sequence.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        self.by_qualified.insert(
            qualified.clone(),
            RegistryEntry {
                tool,
                registered_at: seq,
            },
        );

        let winner = {
            let mut routes = self.routes.entry(bare.clone()).or_default();
            routes.retain(|r| r.qualified_id != qualified);
            routes.push(BackendRoute { qualified_id: qualified.clone(), registered_at: seq, priority });
            sort_routes(&mut routes);
            routes[0].qualified_id.clone()
        };
        self.bare_names.insert(bare.clone(), winner.clone());

        if winner == qualified {
            info!(tool = %bare, backend = %backend, "tool registered");
            let _ = self.events.send(RegistryEvent::Registered { id: bare, backend });
        } else {
            let winner_backend = winner
                .split_once(':')
                .map_or_else(|| winner.clone(), |(b, _)| b.to_string());
            debug!(tool = %bare, backend = %backend, shadowed_by = %winner_backend, "tool shadowed");
            let _ = self.events.send(RegistryEvent::Shadowed {
                id: bare,
                backend,
                shadowed_by: winner_backend,
            });
        }
    }

    /// Remove `qualified`'s route from `bare`'s route list and recompute the
    /// bare-name winner, returning it (`None` if no route remains).
    fn remove_route(&self, bare: &str, qualified: &str) -> Option<String> {
        let remaining = {
            let Some(mut routes) = self.routes.get_mut(bare) else {
                return None;
            };
            routes.retain(|r| r.qualified_id != qualified);
            routes.first().map(|r| r.qualified_id.clone())
        };
        if remaining.is_none() {
            self.routes.remove(bare);
        }
        remaining
    }

    /// Remove every tool owned by `backend` (called on backend stop).
    pub fn deregister_backend(&self, backend: &str) {
        let prefix = format!("{backend}:");
        let doomed: Vec<String> = self
            .by_qualified
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.key().clone())
            .collect();

        for qualified in doomed {
            if let Some((_, entry)) = self.by_qualified.remove(&qualified) {
                let bare = entry.tool.id.as_str().to_string();
                let next_winner = self.remove_route(&bare, &qualified);
                let still_bare_owner = self.bare_names.get(&bare).is_some_and(|v| *v == qualified);
                if still_bare_owner {
                    match next_winner {
                        Some(next) => {
                            self.bare_names.insert(bare.clone(), next);
                        }
                        None => {
                            self.bare_names.remove(&bare);
                        }
                    }
                }
                let _ = self.events.send(RegistryEvent::Deregistered {
                    id: bare,
                    backend: backend.to_string(),
                });
            }
        }
    }

    /// Reconcile `backend`'s tool set against a freshly re-listed snapshot
    /// from its adapter (C4's periodic `refresh_interval` re-list), emitting
    /// `tool_added` (via [`Self::register`]), `tool_removed`
    /// (via [`Self::deregister_backend`]'s per-tool path), and
    /// [`RegistryEvent::Changed`] for tools whose content changed without
    /// changing identity. Idempotent to call with an unchanged `tools` list.
    /// Tools newly added by this refresh are registered at `priority`; tools
    /// that already have a route keep their originally registered priority.
    pub fn refresh_backend(&self, backend: &str, tools: Vec<CanonicalTool>) {
        self.refresh_backend_with_priority(backend, tools, 0);
    }

    /// [`Self::refresh_backend`], registering any newly discovered tool at
    /// `priority`.
    pub fn refresh_backend_with_priority(&self, backend: &str, tools: Vec<CanonicalTool>, priority: i32) {
        let prefix = format!("{backend}:");
        let previous: std::collections::HashSet<String> = self
            .by_qualified
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.value().tool.id.as_str().to_string())
            .collect();

        let mut seen = std::collections::HashSet::new();
        for tool in tools {
            let bare = tool.id.as_str().to_string();
            seen.insert(bare.clone());
            let qualified = tool.qualified_id();

            match self.by_qualified.get(&qualified) {
                Some(existing) if existing.tool.content_hash() == tool.content_hash() => {
                    // Unchanged; nothing to do.
                }
                Some(existing) => {
                    let seq = existing.registered_at;
                    drop(existing);
                    self.by_qualified.insert(qualified, RegistryEntry { tool, registered_at: seq });
                    debug!(tool = %bare, %backend, "tool changed on refresh");
                    let _ = self.events.send(RegistryEvent::Changed { id: bare, backend: backend.to_string() });
                }
                None => self.register_with_priority(tool, priority),
            }
        }

        for bare in previous.difference(&seen) {
            let qualified = format!("{backend}:{bare}");
            if self.by_qualified.remove(&qualified).is_some() {
                let next_winner = self.remove_route(bare, &qualified);
                let still_bare_owner = self.bare_names.get(bare).is_some_and(|v| *v == qualified);
                if still_bare_owner {
                    match next_winner {
                        Some(next) => {
                            self.bare_names.insert(bare.clone(), next);
                        }
                        None => {
                            self.bare_names.remove(bare);
                        }
                    }
                }
                let _ = self.events.send(RegistryEvent::Deregistered { id: bare.clone(), backend: backend.to_string() });
            }
        }
    }

    /// Resolve a tool reference: a bare name resolves to its current
    /// bare-name owner regardless of health; a qualified (`backend:tool`)
    /// reference always resolves to that exact entry regardless of
    /// shadowing. Use [`Self::select_backend`] instead when the caller is
    /// about to dispatch and needs a route to a backend that is actually
    /// healthy right now.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<RegistryEntry> {
        if reference.contains(':') {
            return self.by_qualified.get(reference).map(|e| e.clone());
        }
        let qualified = self.bare_names.get(reference)?.clone();
        self.by_qualified.get(&qualified).map(|e| e.clone())
    }

    /// Resolve `reference` the way [`Self::resolve`] does, but additionally
    /// require the owning backend to be healthy per `health`.
    ///
    /// A qualified reference resolves only to that exact backend's entry,
    /// and returns `None` (not a fallback) if that backend is unhealthy --
    /// a qualified id is a caller's explicit choice of backend, not a
    /// routing hint. A bare reference walks its routes in priority order,
    /// skipping unhealthy backends, and returns the first healthy one; if
    /// none are healthy, returns `None` rather than the ordinarily-winning
    /// but currently-unreachable entry. This is the registry's half of the
    /// property that a tool is never exposed for selection when its backend
    /// is unhealthy at the time of selection.
    #[must_use]
    pub fn select_backend(&self, reference: &str, health: &dyn HealthView) -> Option<RegistryEntry> {
        if let Some((backend, _)) = reference.split_once(':') {
            if !health.is_healthy(backend) {
                return None;
            }
            return self.by_qualified.get(reference).map(|e| e.clone());
        }

        let routes = self.routes.get(reference)?;
        let healthy = routes
            .iter()
            .find(|route| {
                let backend = route
                    .qualified_id
                    .split_once(':')
                    .map_or(route.qualified_id.as_str(), |(b, _)| b);
                health.is_healthy(backend)
            })
            .map(|route| route.qualified_id.clone())?;
        drop(routes);
        self.by_qualified.get(&healthy).map(|e| e.clone())
    }

    /// All registered entries, across every backend.
    #[must_use]
    pub fn all(&self) -> Vec<RegistryEntry> {
        self.by_qualified.iter().map(|e| e.value().clone()).collect()
    }

    /// Distinct backend names with at least one registered tool.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_qualified
            .iter()
            .map(|e| e.value().tool.origin.backend_name().to_string())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Run `selector` over every registered entry for `query`.
    #[must_use]
    pub fn search(&self, query: &str, selector: &dyn Selector) -> Vec<RegistryEntry> {
        let entries: Vec<RegistryEntry> = self.all();
        let refs: Vec<&RegistryEntry> = entries.iter().collect();
        selector
            .search(query, refs)
            .into_iter()
            .cloned()
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Current time in epoch milliseconds, used for registry event timestamps
/// in callers that want to log alongside circuit-breaker stats.
#[must_use]
pub fn epoch_millis_now() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Shared, cloneable handle to a [`Registry`].
pub type SharedRegistry = Arc<Registry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{ToolId, ToolOrigin};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn tool(name: &str, backend: &str) -> CanonicalTool {
        CanonicalTool {
            id: ToolId::new(name),
            summary: format!("{name} summary"),
            description: format!("{name} description from {backend}"),
            input_schema: json!({"type": "object"}),
            output_schema: None,
            origin: ToolOrigin::Mcp { backend: backend.to_string() },
            idempotent: false,
            examples: vec![],
            tags: vec![],
            required_scopes: vec![],
            version: "1.0.0".to_string(),
            source_format: "mcp".to_string(),
            source_metadata: json!({}),
        }
    }

    /// A [`HealthView`] test double backed by an explicit unhealthy set;
    /// every other backend is reported healthy.
    #[derive(Default)]
    struct FakeHealth(Mutex<HashMap<String, bool>>);

    impl FakeHealth {
        fn mark_unhealthy(&self, backend: &str) {
            self.0.lock().unwrap().insert(backend.to_string(), false);
        }
    }

    impl HealthView for FakeHealth {
        fn is_healthy(&self, backend: &str) -> bool {
            self.0.lock().unwrap().get(backend).copied().unwrap_or(true)
        }
    }

    #[test]
    fn first_registration_wins_the_bare_name() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("search", "google"));

        let resolved = registry.resolve("search").unwrap();
        assert_eq!(resolved.tool.origin.backend_name(), "brave");

        let shadowed = registry.resolve("google:search").unwrap();
        assert_eq!(shadowed.tool.origin.backend_name(), "google");
    }

    #[test]
    fn higher_priority_registration_preempts_the_bare_name() {
        let registry = Registry::new();
        registry.register_with_priority(tool("search", "brave"), 0);
        registry.register_with_priority(tool("search", "google"), 10);

        let resolved = registry.resolve("search").unwrap();
        assert_eq!(resolved.tool.origin.backend_name(), "google");
    }

    #[test]
    fn deregister_backend_promotes_next_oldest() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("search", "google"));

        registry.deregister_backend("brave");

        let resolved = registry.resolve("search").unwrap();
        assert_eq!(resolved.tool.origin.backend_name(), "google");
    }

    #[test]
    fn namespaces_lists_distinct_backends() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("fetch", "brave"));
        registry.register(tool("search", "google"));

        assert_eq!(registry.namespaces(), vec!["brave".to_string(), "google".to_string()]);
    }

    #[test]
    fn substring_selector_matches_description() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("weather", "noaa"));

        let results = registry.search("brave", &SubstringSelector);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool.origin.backend_name(), "brave");
    }

    #[test]
    fn refresh_backend_adds_removes_and_changes() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("fetch", "brave"));

        let mut changed_search = tool("search", "brave");
        changed_search.description = "a brand new description".to_string();
        registry.refresh_backend("brave", vec![changed_search, tool("new-tool", "brave")]);

        // "fetch" disappeared from the re-list: removed.
        assert!(registry.resolve("fetch").is_none());
        // "search" kept its identity but picked up new content.
        let search = registry.resolve("search").unwrap();
        assert_eq!(search.tool.description, "a brand new description");
        // "new-tool" is freshly addressable.
        assert!(registry.resolve("new-tool").is_some());
    }

    #[test]
    fn refresh_backend_is_idempotent_for_unchanged_tools() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        let before = registry.resolve("search").unwrap().registered_at;

        registry.refresh_backend("brave", vec![tool("search", "brave")]);

        let after = registry.resolve("search").unwrap().registered_at;
        assert_eq!(before, after);
    }

    #[test]
    fn empty_query_returns_everything() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("weather", "noaa"));

        assert_eq!(registry.search("", &SubstringSelector).len(), 2);
    }

    #[test]
    fn select_backend_skips_unhealthy_bare_name_owner() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("search", "google"));
        let health = FakeHealth::default();
        health.mark_unhealthy("brave");

        let selected = registry.select_backend("search", &health).unwrap();
        assert_eq!(selected.tool.origin.backend_name(), "google");
    }

    #[test]
    fn select_backend_returns_none_when_every_route_is_unhealthy() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("search", "google"));
        let health = FakeHealth::default();
        health.mark_unhealthy("brave");
        health.mark_unhealthy("google");

        assert!(registry.select_backend("search", &health).is_none());
    }

    #[test]
    fn select_backend_on_qualified_reference_does_not_fail_over() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));
        registry.register(tool("search", "google"));
        let health = FakeHealth::default();
        health.mark_unhealthy("brave");

        // An explicit qualified reference to the unhealthy backend stays
        // unavailable even though "google" could serve the bare name.
        assert!(registry.select_backend("brave:search", &health).is_none());
        assert!(registry.select_backend("google:search", &health).is_some());
    }

    #[test]
    fn select_backend_with_always_healthy_matches_resolve() {
        let registry = Registry::new();
        registry.register(tool("search", "brave"));

        let resolved = registry.resolve("search").unwrap();
        let selected = registry.select_backend("search", &AlwaysHealthy).unwrap();
        assert_eq!(resolved.tool.origin.backend_name(), selected.tool.origin.backend_name());
    }
}
