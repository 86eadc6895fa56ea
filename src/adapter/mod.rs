//! Protocol adapters.
//!
//! An adapter discovers tools from one kind of tool source and converts them
//! to [`CanonicalTool`](crate::canonical::CanonicalTool). The round-trip law
//! is: `to_canonical(native) -> invoke(canonical_call) -> native_result` must
//! behave exactly as calling the native source directly would have.

mod capability;
mod local;
mod mcp;

pub use capability::CapabilityAdapter;
pub use local::{BACKEND_NAME as LOCAL_BACKEND_NAME, LocalAdapter};
pub use mcp::McpAdapter;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::canonical::CanonicalTool;

/// A JSON Schema feature an adapter's native wire format may or may not be
/// able to express losslessly. `from_canonical` consults [`Adapter::supports`]
/// for each feature a tool's schema actually uses before deciding whether the
/// conversion back to native form must drop something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaFeature {
    /// An object property whose own schema is itself `type: object`.
    NestedObjects,
    /// `type: array` / an `items` schema.
    Arrays,
    /// An `enum` constraint.
    Enums,
    /// A `pattern` regex constraint on a string.
    PatternValidation,
    /// `$ref`, `$defs`, or `definitions`.
    ReferenceDefinitions,
    /// `nullable`, or `type` including `"null"`.
    Nullable,
    /// `anyOf`.
    AnyOf,
    /// `oneOf`.
    OneOf,
    /// A `default` value.
    DefaultValues,
}

impl SchemaFeature {
    /// Every feature kind, in the order [`schema_features`] reports them.
    pub const ALL: [SchemaFeature; 9] = [
        SchemaFeature::NestedObjects,
        SchemaFeature::Arrays,
        SchemaFeature::Enums,
        SchemaFeature::PatternValidation,
        SchemaFeature::ReferenceDefinitions,
        SchemaFeature::Nullable,
        SchemaFeature::AnyOf,
        SchemaFeature::OneOf,
        SchemaFeature::DefaultValues,
    ];
}

/// Walk `schema` and report every [`SchemaFeature`] it actually uses.
///
/// Adapters call this from `from_canonical` to decide whether a tool's
/// schema needs something their wire format cannot express.
#[must_use]
pub fn schema_features(schema: &Value) -> Vec<SchemaFeature> {
    let mut found = Vec::new();
    walk_schema(schema, false, &mut found);
    found
}

fn mark(found: &mut Vec<SchemaFeature>, feature: SchemaFeature) {
    if !found.contains(&feature) {
        found.push(feature);
    }
}

fn walk_schema(node: &Value, nested: bool, found: &mut Vec<SchemaFeature>) {
    let Some(obj) = node.as_object() else { return };

    if obj.contains_key("enum") {
        mark(found, SchemaFeature::Enums);
    }
    if obj.contains_key("pattern") {
        mark(found, SchemaFeature::PatternValidation);
    }
    if obj.contains_key("$ref") || obj.contains_key("$defs") || obj.contains_key("definitions") {
        mark(found, SchemaFeature::ReferenceDefinitions);
    }
    if obj.contains_key("default") {
        mark(found, SchemaFeature::DefaultValues);
    }
    let nullable_type = match obj.get("type") {
        Some(Value::String(t)) => t == "null",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("null")),
        _ => false,
    };
    if nullable_type || obj.contains_key("nullable") {
        mark(found, SchemaFeature::Nullable);
    }

    let is_object = obj.get("type").and_then(Value::as_str) == Some("object") || obj.contains_key("properties");
    if is_object {
        if nested {
            mark(found, SchemaFeature::NestedObjects);
        }
        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            for value in props.values() {
                walk_schema(value, true, found);
            }
        }
    }

    if obj.get("type").and_then(Value::as_str) == Some("array") || obj.contains_key("items") {
        mark(found, SchemaFeature::Arrays);
        if let Some(items) = obj.get("items") {
            walk_schema(items, nested, found);
        }
    }

    if let Some(arr) = obj.get("anyOf").and_then(Value::as_array) {
        mark(found, SchemaFeature::AnyOf);
        for value in arr {
            walk_schema(value, nested, found);
        }
    }
    if let Some(arr) = obj.get("oneOf").and_then(Value::as_array) {
        mark(found, SchemaFeature::OneOf);
        for value in arr {
            walk_schema(value, nested, found);
        }
    }
    if let Some(arr) = obj.get("allOf").and_then(Value::as_array) {
        for value in arr {
            walk_schema(value, nested, found);
        }
    }
    for defs_key in ["$defs", "definitions"] {
        if let Some(defs) = obj.get(defs_key).and_then(Value::as_object) {
            for value in defs.values() {
                walk_schema(value, nested, found);
            }
        }
    }
}

/// A source of tools the gateway can list and invoke.
///
/// Every adapter kind (MCP backend, built-in provider, REST capability)
/// implements this one trait, so the registry and pipeline never need to
/// know which kind of source produced a given [`CanonicalTool`].
///
/// Beyond the C4 driver contract (`list_tools`/`invoke`/`health`), every
/// adapter is also a C2 protocol adapter: it must convert its native tool
/// records to and from the canonical form. The round-trip law is: for any
/// raw tool `r` this adapter accepts, `from_canonical(to_canonical(r))` must
/// reproduce `r` except for fields the canonical form cannot express, which
/// `to_canonical` preserves in `source_metadata` and `from_canonical`
/// re-applies. If the canonical tool uses a [`SchemaFeature`] this adapter
/// does not [`supports`](Adapter::supports), `from_canonical` strips it and
/// reports the conversion as lossy rather than failing outright.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable name identifying this adapter instance (a backend name, the
    /// fixed string `"local"`, or a capability name).
    fn name(&self) -> &str;

    /// List the tools currently exposed by this source.
    async fn list_tools(&self) -> Result<Vec<CanonicalTool>>;

    /// Invoke `tool_id` (the bare name this adapter registered it under,
    /// never backend-qualified) with `arguments`, returning its raw JSON
    /// result. `idempotent` is the tool's declared
    /// [`CanonicalTool::idempotent`](crate::canonical::CanonicalTool::idempotent)
    /// and gates whether a transient failure may be retried: an adapter
    /// backed by a live transport must not retry a non-idempotent call.
    async fn invoke(&self, tool_id: &str, arguments: Value, idempotent: bool) -> Result<Value>;

    /// Cheap liveness check used by readiness reporting and the circuit
    /// breaker's half-open probe.
    async fn health(&self) -> Result<()>;

    /// Decode one native tool record (already parsed out of this adapter's
    /// wire format into JSON) into its canonical form.
    fn to_canonical(&self, raw: Value) -> Result<CanonicalTool>;

    /// Encode a canonical tool back into this adapter's native wire shape.
    /// Returns the encoded record and whether encoding it was lossy: `true`
    /// when `tool`'s schema used a [`SchemaFeature`] this adapter does not
    /// support, and that feature had to be dropped.
    fn from_canonical(&self, tool: &CanonicalTool) -> Result<(Value, bool)>;

    /// Whether this adapter's wire format can express `feature` without
    /// loss of information.
    fn supports(&self, feature: SchemaFeature) -> bool;
}

/// Shared `from_canonical` lossy check: `true` iff `tool`'s input schema uses
/// a feature `supports` rejects.
#[must_use]
pub fn is_lossy(tool: &CanonicalTool, supports: impl Fn(SchemaFeature) -> bool) -> bool {
    schema_features(&tool.input_schema).into_iter().any(|feature| !supports(feature))
}
