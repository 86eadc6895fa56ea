//! Progressive-disclosure documentation store.
//!
//! `describe_tool` can return one of three nested levels of detail:
//! `summary` (one line), `schema` (summary plus input/output JSON Schema),
//! and `full` (schema plus rendered description and worked examples).
//! `summary` is always a substring-safe subset of `schema`'s fields, which
//! is itself a subset of `full`'s — the containment the specification calls
//! the disclosure levels' invariant.
//!
//! Each level is cached independently, keyed by `(qualified id, level,
//! record-hash)`: the hash is a SHA-256 digest of that level's rendered
//! content, so a tool edit invalidates only the levels whose content
//! actually changed, and an unchanged re-derivation is served from cache
//! rather than recomputed. TTL is level-specific (`summary >= schema >=
//! full`, coarser views churn less) and mirrors `cache::ResponseCache`'s
//! DashMap + SHA-256 + TTL shape, generalized to three independently-aged
//! slices instead of one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalTool;

/// A tool's documentation at every disclosure level.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentationRecord {
    /// One-line summary (`CanonicalTool::summary`).
    pub summary: String,
    /// Input/output JSON Schema, alongside the summary.
    pub schema: SchemaView,
    /// Full prose description and worked examples, alongside `schema`.
    pub full: FullView,
}

/// The `schema` disclosure level: summary plus both schemas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaView {
    /// Same as `DocumentationRecord::summary`.
    pub summary: String,
    /// Input JSON Schema.
    pub input_schema: Value,
    /// Output JSON Schema, when declared.
    pub output_schema: Option<Value>,
}

/// The `full` disclosure level: everything `schema` has, plus prose and
/// examples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullView {
    /// Same as `SchemaView`, duplicated so `full` alone is self-contained.
    pub summary: String,
    /// Input JSON Schema.
    pub input_schema: Value,
    /// Output JSON Schema, when declared.
    pub output_schema: Option<Value>,
    /// Full prose description.
    pub description: String,
    /// Worked examples, rendered as plain JSON.
    pub examples: Vec<Value>,
}

/// Which disclosure level a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disclosure {
    /// One line.
    Summary,
    /// Summary plus schema.
    Schema,
    /// Schema plus prose and examples.
    Full,
}

impl DocumentationRecord {
    fn from_tool(tool: &CanonicalTool) -> Self {
        let schema = SchemaView {
            summary: tool.summary.clone(),
            input_schema: tool.input_schema.clone(),
            output_schema: tool.output_schema.clone(),
        };
        let full = FullView {
            summary: tool.summary.clone(),
            input_schema: tool.input_schema.clone(),
            output_schema: tool.output_schema.clone(),
            description: tool.description.clone(),
            examples: tool
                .examples
                .iter()
                .map(|e| serde_json::json!({"description": e.description, "arguments": e.arguments}))
                .collect(),
        };
        Self {
            summary: tool.summary.clone(),
            schema,
            full,
        }
    }

    /// Render only the requested disclosure level as a JSON value, the
    /// shape returned by the `describe_tool` provider.
    #[must_use]
    pub fn render(&self, level: Disclosure) -> Value {
        match level {
            Disclosure::Summary => serde_json::json!({"summary": self.summary}),
            Disclosure::Schema => serde_json::to_value(&self.schema).unwrap_or(Value::Null),
            Disclosure::Full => serde_json::to_value(&self.full).unwrap_or(Value::Null),
        }
    }

    fn slice(&self, level: Disclosure) -> Value {
        self.render(level)
    }
}

/// Level-specific TTLs, coarsest-first: `summary >= schema >= full`.
#[derive(Debug, Clone, Copy)]
pub struct LevelTtls {
    /// TTL for the `summary` slice.
    pub summary: Duration,
    /// TTL for the `schema` slice.
    pub schema: Duration,
    /// TTL for the `full` slice.
    pub full: Duration,
}

impl LevelTtls {
    fn for_level(self, level: Disclosure) -> Duration {
        match level {
            Disclosure::Summary => self.summary,
            Disclosure::Schema => self.schema,
            Disclosure::Full => self.full,
        }
    }
}

impl Default for LevelTtls {
    /// Coarser views are cheaper to keep around and churn less, so they get
    /// the longest TTL: ten minutes for `summary`, five for `schema`, one
    /// for `full` (examples are the most likely thing to be edited).
    fn default() -> Self {
        Self {
            summary: Duration::from_secs(600),
            schema: Duration::from_secs(300),
            full: Duration::from_secs(60),
        }
    }
}

/// A cached disclosure-level slice, keyed by `(id, level, record-hash)` --
/// the hash is folded into the stored entry rather than the map key so a
/// stale-hash hit can be detected and treated as a miss without scanning.
struct CachedSlice {
    value: Value,
    hash: String,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedSlice {
    fn is_expired(&self) -> bool {
        Instant::now().duration_since(self.cached_at) > self.ttl
    }
}

fn hash_slice(value: &Value) -> String {
    let canonical = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Documentation for every tool currently registered, keyed by qualified id.
///
/// Entries are derived, not authored: `upsert` recomputes a record from a
/// `CanonicalTool` whenever the registry re-registers it, so the store never
/// drifts from the registry it shadows. Each disclosure level additionally
/// keeps its own TTL'd, hash-validated cache entry (`get`/`get_level`
/// recompute and repopulate the cache automatically on miss or staleness),
/// giving `summary`/`schema`/`full` independent cache lifetimes even though
/// they're derived from the same source record.
pub struct Store {
    sources: RwLock<std::collections::HashMap<String, CanonicalTool>>,
    summary_cache: DashMap<String, CachedSlice>,
    schema_cache: DashMap<String, CachedSlice>,
    full_cache: DashMap<String, CachedSlice>,
    ttls: LevelTtls,
}

impl Store {
    /// Create an empty store with the default level TTLs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttls(LevelTtls::default())
    }

    /// Create an empty store with explicit level TTLs.
    #[must_use]
    pub fn with_ttls(ttls: LevelTtls) -> Self {
        Self {
            sources: RwLock::new(std::collections::HashMap::new()),
            summary_cache: DashMap::new(),
            schema_cache: DashMap::new(),
            full_cache: DashMap::new(),
            ttls,
        }
    }

    fn cache_for(&self, level: Disclosure) -> &DashMap<String, CachedSlice> {
        match level {
            Disclosure::Summary => &self.summary_cache,
            Disclosure::Schema => &self.schema_cache,
            Disclosure::Full => &self.full_cache,
        }
    }

    /// Derive and store documentation for `tool`, keyed by its qualified id.
    ///
    /// Does not evict cached slices directly: a changed tool produces a
    /// different per-level hash, so the next `get`/`get_level` call for that
    /// id naturally misses the stale entry and recomputes, giving
    /// read-your-writes without an explicit invalidation pass.
    pub fn upsert(&self, tool: &CanonicalTool) {
        self.sources.write().insert(tool.qualified_id(), tool.clone());
    }

    /// Remove documentation for a tool that left the registry.
    pub fn remove(&self, qualified_id: &str) {
        self.sources.write().remove(qualified_id);
        self.summary_cache.remove(qualified_id);
        self.schema_cache.remove(qualified_id);
        self.full_cache.remove(qualified_id);
    }

    /// Look up the full documentation record by qualified id, populating
    /// (or refreshing) all three level caches along the way.
    #[must_use]
    pub fn get(&self, qualified_id: &str) -> Option<DocumentationRecord> {
        let tool = self.sources.read().get(qualified_id).cloned()?;
        let record = DocumentationRecord::from_tool(&tool);
        for level in [Disclosure::Summary, Disclosure::Schema, Disclosure::Full] {
            self.cached_slice(qualified_id, &record, level);
        }
        Some(record)
    }

    /// Look up a single disclosure level, keyed by `(id, level, record-hash)`
    /// with that level's own TTL. A hit that matches the current source's
    /// hash is served without recomputation; a miss, a hash mismatch (the
    /// tool changed), or TTL expiry all fall through to a fresh render.
    #[must_use]
    pub fn get_level(&self, qualified_id: &str, level: Disclosure) -> Option<Value> {
        let tool = self.sources.read().get(qualified_id).cloned()?;
        let record = DocumentationRecord::from_tool(&tool);
        Some(self.cached_slice(qualified_id, &record, level))
    }

    fn cached_slice(&self, qualified_id: &str, record: &DocumentationRecord, level: Disclosure) -> Value {
        let cache = self.cache_for(level);
        let value = record.slice(level);
        let hash = hash_slice(&value);

        if let Some(entry) = cache.get(qualified_id) {
            if !entry.is_expired() && entry.hash == hash {
                return entry.value.clone();
            }
        }

        let ttl = self.ttls.for_level(level);
        cache.insert(
            qualified_id.to_string(),
            CachedSlice { value: value.clone(), hash, cached_at: Instant::now(), ttl },
        );
        value
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, cloneable handle to a [`Store`].
pub type SharedStore = Arc<Store>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::{ToolExample, ToolId, ToolOrigin};
    use serde_json::json;

    fn sample_tool() -> CanonicalTool {
        CanonicalTool {
            id: ToolId::new("search"),
            summary: "Search the web".into(),
            description: "Search the web for a query string and return ranked results.".into(),
            input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
            output_schema: Some(json!({"type": "array"})),
            origin: ToolOrigin::Mcp { backend: "brave".into() },
            idempotent: true,
            examples: vec![ToolExample {
                description: "basic search".into(),
                arguments: json!({"q": "rust mcp"}),
            }],
            tags: vec![],
            required_scopes: vec![],
            version: "1.0.0".to_string(),
            source_format: "mcp".to_string(),
            source_metadata: json!({}),
        }
    }

    #[test]
    fn summary_is_contained_in_schema_is_contained_in_full() {
        let tool = sample_tool();
        let record = DocumentationRecord::from_tool(&tool);

        assert_eq!(record.summary, record.schema.summary);
        assert_eq!(record.schema.summary, record.full.summary);
        assert_eq!(record.schema.input_schema, record.full.input_schema);
    }

    #[test]
    fn render_summary_omits_schema_and_description() {
        let tool = sample_tool();
        let record = DocumentationRecord::from_tool(&tool);
        let rendered = record.render(Disclosure::Summary);
        assert!(rendered.get("input_schema").is_none());
        assert!(rendered.get("description").is_none());
    }

    #[test]
    fn render_full_includes_examples() {
        let tool = sample_tool();
        let record = DocumentationRecord::from_tool(&tool);
        let rendered = record.render(Disclosure::Full);
        assert_eq!(rendered["examples"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let store = Store::new();
        let tool = sample_tool();
        store.upsert(&tool);
        let record = store.get(&tool.qualified_id()).unwrap();
        assert_eq!(record.summary, "Search the web");
    }

    #[test]
    fn remove_clears_entry() {
        let store = Store::new();
        let tool = sample_tool();
        store.upsert(&tool);
        store.remove(&tool.qualified_id());
        assert!(store.get(&tool.qualified_id()).is_none());
    }

    #[test]
    fn remove_also_clears_per_level_cache() {
        let store = Store::new();
        let tool = sample_tool();
        store.upsert(&tool);
        let id = tool.qualified_id();
        store.get_level(&id, Disclosure::Full);
        store.remove(&id);
        assert!(store.get_level(&id, Disclosure::Full).is_none());
        assert!(store.full_cache.get(&id).is_none());
    }

    #[test]
    fn get_level_hits_cache_for_unchanged_content() {
        let store = Store::new();
        let tool = sample_tool();
        store.upsert(&tool);
        let id = tool.qualified_id();

        let first = store.get_level(&id, Disclosure::Schema).unwrap();
        // A second call within TTL with unchanged content must be served
        // from the same cache entry (same hash, not expired).
        let second = store.get_level(&id, Disclosure::Schema).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.schema_cache.len(), 1);
    }

    #[test]
    fn edited_tool_invalidates_only_changed_levels() {
        let store = Store::new();
        let mut tool = sample_tool();
        store.upsert(&tool);
        let id = tool.qualified_id();
        store.get(&id);

        let summary_hash_before = store.summary_cache.get(&id).unwrap().hash.clone();
        let full_hash_before = store.full_cache.get(&id).unwrap().hash.clone();

        tool.description = "a completely rewritten description".into();
        store.upsert(&tool);
        store.get(&id);

        assert_eq!(store.summary_cache.get(&id).unwrap().hash, summary_hash_before, "summary text is unaffected by a description edit");
        assert_ne!(store.full_cache.get(&id).unwrap().hash, full_hash_before, "full includes description, so its hash must change");
    }

    #[test]
    fn slice_ttl_expiry_forces_recompute() {
        let store = Store::with_ttls(LevelTtls { summary: Duration::from_millis(1), schema: Duration::from_secs(60), full: Duration::from_secs(60) });
        let tool = sample_tool();
        store.upsert(&tool);
        let id = tool.qualified_id();
        store.get_level(&id, Disclosure::Summary);
        let cached_at_before = store.summary_cache.get(&id).unwrap().cached_at;

        std::thread::sleep(Duration::from_millis(5));
        store.get_level(&id, Disclosure::Summary);
        let cached_at_after = store.summary_cache.get(&id).unwrap().cached_at;
        assert!(cached_at_after > cached_at_before, "expired entry must be recomputed, not just re-served");
    }

    #[test]
    fn default_ttls_are_ordered_summary_ge_schema_ge_full() {
        let ttls = LevelTtls::default();
        assert!(ttls.summary >= ttls.schema);
        assert!(ttls.schema >= ttls.full);
    }
}
