//! The canonical tool model.
//!
//! Every tool the gateway can run, regardless of which adapter discovered it,
//! is normalized into a [`CanonicalTool`] before it reaches the registry. The
//! round-trip law for an adapter is: decoding a native tool record into a
//! `CanonicalTool` and re-encoding it for that same adapter's wire format
//! must reproduce the original record field-for-field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stable identifier for a tool within a single backend's namespace.
///
/// Construction never fails: any string is a legal bare name. Qualification
/// with a backend name happens at the registry layer, not here, since a
/// `CanonicalTool` does not know which other backends it shares a name with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolId(pub String);

impl ToolId {
    /// Wrap a bare tool name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the underlying name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which adapter produced a [`CanonicalTool`], and what it needs to route a
/// `run_tool` call back to the originating backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    /// Discovered by proxying a live MCP backend (stdio or HTTP transport).
    Mcp {
        /// Backend name as configured.
        backend: String,
    },
    /// One of the gateway's own built-in providers (C12).
    Local,
    /// Declared by a YAML capability definition, invoked over REST.
    Capability {
        /// Capability definition name.
        capability: String,
    },
}

impl ToolOrigin {
    /// The backend name this tool is routed through, for namespacing and
    /// collision messages. Local tools use the fixed pseudo-backend `"local"`.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        match self {
            Self::Mcp { backend } => backend,
            Self::Local => "local",
            Self::Capability { capability } => capability,
        }
    }
}

/// A short worked example for a tool, surfaced by `list_tool_examples`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExample {
    /// One-line description of what the example demonstrates.
    pub description: String,
    /// Example arguments, valid against the tool's input schema.
    pub arguments: Value,
}

/// The normalized representation of a tool, independent of its source
/// protocol. This is THE shape every adapter converts into and every
/// middleware stage and provider operates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTool {
    /// Bare name, unique within `origin`'s backend.
    pub id: ToolId,
    /// One-line summary (the `summary` disclosure level, see `docstore`).
    pub summary: String,
    /// Full human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input arguments.
    pub input_schema: Value,
    /// JSON Schema for the tool's output, when the source declares one.
    pub output_schema: Option<Value>,
    /// Where this tool came from and how to route calls to it.
    pub origin: ToolOrigin,
    /// Whether repeating an identical call is safe without side effects
    /// beyond the first. Drives the resilience stage's retry-after-failure
    /// rule and `run_tool`'s idempotency-key handling.
    pub idempotent: bool,
    /// Worked examples, if the source declares any.
    pub examples: Vec<ToolExample>,
    /// Free-text tags used by `search_tools` ranking and toolset filters.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Capability scopes a caller's identity must hold to invoke this tool.
    /// Checked by the authorization pipeline stage in addition to its
    /// role/permission table.
    #[serde(default)]
    pub required_scopes: Vec<String>,
    /// Semver version of this tool's declaration, completing the
    /// `(namespace, name, version)` identity tuple. Sources that don't
    /// declare one (most MCP servers today) default to `"1.0.0"`.
    #[serde(default = "default_tool_version")]
    pub version: String,
    /// Which adapter kind produced this tool (`"mcp"`, `"local"`,
    /// `"capability"`, ...), independent of `origin`'s backend *instance*
    /// name. `Adapter::from_canonical` dispatches on this tag rather than on
    /// `origin`, so a generic pipeline stage never needs to match on
    /// [`ToolOrigin`]'s variants to find the right reverse conversion.
    #[serde(default = "default_source_format")]
    pub source_format: String,
    /// Opaque, adapter-defined fields the canonical model has no place for,
    /// preserved verbatim so `from_canonical` can re-apply them. This is
    /// what makes the round-trip law (§8 invariant #1) satisfiable for
    /// sources whose native format is richer than the canonical one.
    #[serde(default)]
    pub source_metadata: Value,
}

fn default_tool_version() -> String {
    "1.0.0".to_string()
}

fn default_source_format() -> String {
    "unknown".to_string()
}

/// Whether `name` is a legal namespace or bare tool name: lowercase
/// alphanumerics, `_`, and `-` only.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// A minimal `MAJOR.MINOR.PATCH` semver check, with no pre-release or build
/// metadata parsing beyond what the core needs to validate declared tool
/// versions; full semver parsing is left to the tool source, not the
/// gateway.
#[must_use]
pub fn is_valid_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

impl CanonicalTool {
    /// The backend-qualified id (`backend:tool`) always usable to address
    /// this tool through the registry's routing layer (C5), even when its
    /// bare name is shadowed by another backend's tool of the same name.
    ///
    /// This is the *routing* address, distinct from [`Self::stable_id`]'s
    /// versioned *identity*; two different tool versions from the same
    /// backend still route through one `backend:tool` entry, since the
    /// registry indexes the latest registration per bare name.
    #[must_use]
    pub fn qualified_id(&self) -> String {
        format!("{}:{}", self.origin.backend_name(), self.id.as_str())
    }

    /// The specification's `<namespace>:<name>@<version>` stable identity:
    /// unique within one registry snapshot's set of distinct tool versions.
    #[must_use]
    pub fn stable_id(&self) -> String {
        format!("{}:{}@{}", self.origin.backend_name(), self.id.as_str(), self.version)
    }

    /// Content hash over the fields a backend refresh cares about: change in
    /// description, either schema, tags, scopes, or idempotence counts as a
    /// `tool_changed` event; a change in `examples` alone does not, since
    /// examples are documentation-only and would otherwise cause needless
    /// cache invalidation on every doc edit.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.description.hash(&mut hasher);
        self.input_schema.to_string().hash(&mut hasher);
        self.output_schema.as_ref().map(ToString::to_string).hash(&mut hasher);
        self.tags.hash(&mut hasher);
        self.required_scopes.hash(&mut hasher);
        self.idempotent.hash(&mut hasher);
        self.version.hash(&mut hasher);
        hasher.finish()
    }

    /// Check this tool's data-model invariants: namespace and name match
    /// `[a-z0-9_-]+`, version is semver, and every required input field is
    /// declared among the schema's properties.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when a tool fails validation, for
    /// the caller (an adapter or the registry) to log and reject.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_name(self.id.as_str()) {
            return Err(format!("invalid tool name: {}", self.id));
        }
        if !is_valid_name(self.origin.backend_name()) {
            return Err(format!("invalid namespace: {}", self.origin.backend_name()));
        }
        if !is_valid_semver(&self.version) {
            return Err(format!("invalid version (not semver): {}", self.version));
        }

        let required = self.input_schema.get("required").and_then(|v| v.as_array());
        let properties = self.input_schema.get("properties").and_then(|v| v.as_object());
        if let Some(required) = required {
            let declared = properties.map(|p| p.keys().collect::<Vec<_>>()).unwrap_or_default();
            for field in required {
                let Some(field) = field.as_str() else {
                    return Err("required field entry is not a string".to_string());
                };
                if !declared.iter().any(|k| k.as_str() == field) {
                    return Err(format!("required field '{field}' is not declared in properties"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(origin: ToolOrigin) -> CanonicalTool {
        CanonicalTool {
            id: ToolId::new("search"),
            summary: "Search the web".into(),
            description: "Search the web for a query string.".into(),
            input_schema: json!({"type": "object", "properties": {"q": {"type": "string"}}}),
            output_schema: None,
            origin,
            idempotent: true,
            examples: vec![],
            tags: vec![],
            required_scopes: vec![],
            version: "1.0.0".to_string(),
            source_format: "mcp".to_string(),
            source_metadata: json!({}),
        }
    }

    #[test]
    fn qualified_id_combines_backend_and_tool_name() {
        let tool = sample(ToolOrigin::Mcp { backend: "brave".into() });
        assert_eq!(tool.qualified_id(), "brave:search");
    }

    #[test]
    fn local_origin_uses_local_pseudo_backend() {
        let tool = sample(ToolOrigin::Local);
        assert_eq!(tool.origin.backend_name(), "local");
        assert_eq!(tool.qualified_id(), "local:search");
    }

    #[test]
    fn capability_origin_qualifies_by_capability_name() {
        let tool = sample(ToolOrigin::Capability { capability: "finance".into() });
        assert_eq!(tool.qualified_id(), "finance:search");
    }
}
