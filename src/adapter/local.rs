//! Adapter exposing the gateway's own built-in tools.
//!
//! `search_tools`, `describe_tool`, `run_tool`, `run_chain`,
//! `list_namespaces`, `list_tool_examples`, and `execute_code` are not
//! backed by any external process; they are served directly by
//! [`BuiltinProviders`]. Wrapping them in the same `Adapter` contract as
//! every other tool source means the registry and pipeline never special-
//! case them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::canonical::{CanonicalTool, ToolExample, ToolId, ToolOrigin};
use crate::docstore::Disclosure;
use crate::providers::BuiltinProviders;
use crate::{Error, Result};

use super::{Adapter, SchemaFeature, is_lossy};

/// The fixed pseudo-backend name built-in tools register under.
pub const BACKEND_NAME: &str = "local";

/// The adapter tag recorded in [`CanonicalTool::source_format`] for every
/// built-in tool.
pub const SOURCE_FORMAT: &str = "local";

/// Wraps [`BuiltinProviders`] as a tool adapter.
pub struct LocalAdapter {
    providers: Arc<BuiltinProviders>,
}

impl LocalAdapter {
    /// Wrap an already-constructed provider set.
    #[must_use]
    pub fn new(providers: Arc<BuiltinProviders>) -> Self {
        Self { providers }
    }
}

fn tool(id: &str, summary: &str, description: &str, idempotent: bool, input_schema: Value) -> CanonicalTool {
    CanonicalTool {
        id: ToolId::new(id),
        summary: summary.to_string(),
        description: description.to_string(),
        input_schema,
        output_schema: None,
        origin: ToolOrigin::Local,
        idempotent,
        examples: Vec::<ToolExample>::new(),
        tags: vec!["builtin".to_string()],
        required_scopes: vec![],
        version: "1.0.0".to_string(),
        source_format: SOURCE_FORMAT.to_string(),
        source_metadata: Value::Null,
    }
}

/// The static declarations for the seven built-in tools.
fn builtin_tools() -> Vec<CanonicalTool> {
    vec![
        tool(
            "search_tools",
            "Search the tool registry by keyword.",
            "Searches every registered tool's name, summary, and description for a \
             free-text query and returns the matching qualified ids.",
            true,
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
            }),
        ),
        tool(
            "describe_tool",
            "Fetch a tool's documentation at a chosen disclosure level.",
            "Returns a tool's documentation at one of three nested levels: `summary` \
             (one line), `schema` (summary plus input/output JSON Schema), or `full` \
             (schema plus prose description and worked examples).",
            true,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tool": {"type": "string"},
                    "level": {"type": "string", "enum": ["summary", "schema", "full"], "default": "schema"},
                },
                "required": ["tool"],
            }),
        ),
        tool(
            "run_tool",
            "Invoke a registered tool by bare or qualified name.",
            "Resolves a bare or backend-qualified tool reference and dispatches the \
             call through the same middleware chain as a direct backend call.",
            false,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tool": {"type": "string"},
                    "arguments": {"type": "object"},
                },
                "required": ["tool"],
            }),
        ),
        tool(
            "run_chain",
            "Run a multi-step tool chain, named or inline.",
            "Executes either a registered chain by name (`chain` + `inputs`) or an \
             ad-hoc ordered list of steps passed inline (`steps`, each `{id, \
             arguments, input_mapper, on_error}`), interpolating each step's \
             arguments from prior step results before dispatch. `max_steps` caps how \
             many of the inline steps actually run.",
            false,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "chain": {"type": "string"},
                    "inputs": {"type": "object"},
                    "steps": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {"type": "string"},
                                "arguments": {"type": "object"},
                                "input_mapper": {"type": "object"},
                                "on_error": {"type": "string", "enum": ["abort", "continue", "retry"]},
                            },
                            "required": ["id"],
                        },
                    },
                    "max_steps": {"type": "integer", "minimum": 1},
                    "on_error": {"type": "string", "enum": ["abort", "continue", "retry"]},
                    "max_retries": {"type": "integer", "minimum": 1},
                    "timeout": {"type": "integer", "minimum": 1},
                },
            }),
        ),
        tool(
            "list_namespaces",
            "List every backend with at least one registered tool.",
            "Returns the distinct backend names currently contributing tools to the \
             registry.",
            true,
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        tool(
            "list_tool_examples",
            "List a tool's worked examples.",
            "Returns the worked examples recorded in a tool's full documentation view.",
            true,
            serde_json::json!({
                "type": "object",
                "properties": {"tool": {"type": "string"}},
                "required": ["tool"],
            }),
        ),
        tool(
            "execute_code",
            "Run source code in the sandbox adapter.",
            "Runs code in the sandbox adapter under declared resource limits and \
             returns stdout, stderr, and exit code.",
            false,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "language": {"type": "string"},
                    "source": {"type": "string"},
                    "stdin": {"type": "string"},
                    "timeout_secs": {"type": "integer", "minimum": 1, "maximum": 120},
                },
                "required": ["language", "source"],
            }),
        ),
    ]
    .into_iter()
    .map(|mut t| {
        if t.id.as_str() == "execute_code" {
            t.required_scopes = vec!["code:execute".to_string()];
        }
        t
    })
    .collect()
}

fn disclosure_level(params: &Value) -> Disclosure {
    match params.get("level").and_then(Value::as_str) {
        Some("summary") => Disclosure::Summary,
        Some("full") => Disclosure::Full,
        _ => Disclosure::Schema,
    }
}

fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidParams(format!("missing required field: {field}")))
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn list_tools(&self) -> Result<Vec<CanonicalTool>> {
        Ok(builtin_tools())
    }

    async fn invoke(&self, tool_id: &str, arguments: Value, _idempotent: bool) -> Result<Value> {
        match tool_id {
            "search_tools" => {
                let query = require_str(&arguments, "query")?;
                Ok(Value::Array(self.providers.search_tools(query)))
            }
            "describe_tool" => {
                let tool = require_str(&arguments, "tool")?;
                self.providers.describe_tool(tool, disclosure_level(&arguments))
            }
            "run_tool" => {
                let tool = require_str(&arguments, "tool")?.to_string();
                let inner = arguments.get("arguments").cloned().unwrap_or(Value::Null);
                self.providers.run_tool(&tool, inner).await
            }
            "run_chain" => {
                let chain = arguments.get("chain").and_then(Value::as_str);
                self.providers.run_chain(chain, &arguments).await
            }
            "list_namespaces" => Ok(serde_json::json!(self.providers.list_namespaces())),
            "list_tool_examples" => {
                let tool = require_str(&arguments, "tool")?;
                Ok(Value::Array(self.providers.list_tool_examples(tool)?))
            }
            "execute_code" => {
                let language = require_str(&arguments, "language")?.to_string();
                let source = require_str(&arguments, "source")?.to_string();
                let stdin = arguments
                    .get("stdin")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let timeout_secs = arguments.get("timeout_secs").and_then(Value::as_u64);
                self.providers
                    .execute_code(&language, &source, stdin, timeout_secs)
                    .await
            }
            other => Err(Error::NotFound(format!("no built-in tool named {other}"))),
        }
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }

    fn to_canonical(&self, raw: Value) -> Result<CanonicalTool> {
        // Built-in tools are declared directly in canonical form; there is
        // no separate native wire shape to decode out of.
        serde_json::from_value(raw).map_err(Into::into)
    }

    fn from_canonical(&self, tool: &CanonicalTool) -> Result<(Value, bool)> {
        let raw = serde_json::to_value(tool)?;
        Ok((raw, is_lossy(tool, |feature| self.supports(feature))))
    }

    fn supports(&self, _feature: SchemaFeature) -> bool {
        // The canonical form *is* the native form for built-ins.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tools_cover_all_seven_names() {
        let names: Vec<String> = builtin_tools().iter().map(|t| t.id.as_str().to_string()).collect();
        for expected in [
            "search_tools",
            "describe_tool",
            "run_tool",
            "run_chain",
            "list_namespaces",
            "list_tool_examples",
            "execute_code",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn builtin_tools_are_tagged_local_origin() {
        for tool in builtin_tools() {
            assert_eq!(tool.origin.backend_name(), "local");
        }
    }

    #[test]
    fn disclosure_level_defaults_to_schema() {
        assert!(matches!(disclosure_level(&serde_json::json!({})), Disclosure::Schema));
        assert!(matches!(
            disclosure_level(&serde_json::json!({"level": "full"})),
            Disclosure::Full
        ));
    }
}
