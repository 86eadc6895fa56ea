//! Adapter over a live MCP backend (stdio or HTTP transport).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::Result;
use crate::backend::Backend;
use crate::canonical::{CanonicalTool, ToolExample, ToolId, ToolOrigin};
use crate::protocol::{Tool, ToolAnnotations};

use super::{Adapter, SchemaFeature, is_lossy};

/// The adapter tag recorded in [`CanonicalTool::source_format`] for every
/// tool discovered over MCP.
pub const SOURCE_FORMAT: &str = "mcp";

/// Wraps a [`Backend`] and converts its `tools/list` entries to
/// [`CanonicalTool`] on demand.
pub struct McpAdapter {
    backend: Arc<Backend>,
}

impl McpAdapter {
    /// Wrap an already-registered backend.
    #[must_use]
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }
}

/// Convert a native MCP `Tool` record to the canonical shape.
///
/// The annotation `idempotentHint` maps directly; a missing hint defaults to
/// `false` (assume side-effecting unless the backend says otherwise). `title`
/// and the three remaining annotation hints have no canonical field of their
/// own, so they are preserved in `source_metadata` for `tool_from_canonical`
/// to restore.
#[must_use]
pub fn tool_to_canonical(tool: Tool, backend: &str) -> CanonicalTool {
    let idempotent = tool
        .annotations
        .as_ref()
        .and_then(|a| a.idempotent_hint)
        .unwrap_or(false);

    let description = tool.description.clone().unwrap_or_default();
    let summary = description
        .lines()
        .next()
        .unwrap_or(&description)
        .to_string();

    let source_metadata = json!({
        "title": tool.title,
        "annotations": tool.annotations,
    });

    CanonicalTool {
        id: ToolId::new(tool.name),
        summary,
        description,
        input_schema: tool.input_schema,
        output_schema: tool.output_schema,
        origin: ToolOrigin::Mcp {
            backend: backend.to_string(),
        },
        idempotent,
        examples: Vec::<ToolExample>::new(),
        tags: vec![],
        required_scopes: vec![],
        version: "1.0.0".to_string(),
        source_format: SOURCE_FORMAT.to_string(),
        source_metadata,
    }
}

/// Reverse of [`tool_to_canonical`]: rebuild a native MCP `Tool` record from
/// a canonical tool, restoring `title` and the non-idempotence annotation
/// hints from `source_metadata` when present.
#[must_use]
pub fn tool_from_canonical(tool: &CanonicalTool) -> Tool {
    let title = tool
        .source_metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string);
    let mut annotations: Option<ToolAnnotations> = tool
        .source_metadata
        .get("annotations")
        .cloned()
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v).ok());
    if let Some(a) = &mut annotations {
        a.idempotent_hint = Some(tool.idempotent);
    } else {
        annotations = Some(ToolAnnotations { idempotent_hint: Some(tool.idempotent), ..Default::default() });
    }

    Tool {
        name: tool.id.as_str().to_string(),
        title,
        description: Some(tool.description.clone()),
        input_schema: tool.input_schema.clone(),
        output_schema: tool.output_schema.clone(),
        annotations,
    }
}

#[async_trait]
impl Adapter for McpAdapter {
    fn name(&self) -> &str {
        &self.backend.name
    }

    async fn list_tools(&self) -> Result<Vec<CanonicalTool>> {
        let tools = self.backend.get_tools().await?;
        Ok(tools
            .into_iter()
            .map(|t| tool_to_canonical(t, &self.backend.name))
            .collect())
    }

    async fn invoke(&self, tool_id: &str, arguments: Value, idempotent: bool) -> Result<Value> {
        let params = serde_json::json!({
            "name": tool_id,
            "arguments": arguments,
        });
        let response = self
            .backend
            .request_retryable("tools/call", Some(params), idempotent)
            .await?;
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn health(&self) -> Result<()> {
        self.backend.ensure_started().await
    }

    fn to_canonical(&self, raw: Value) -> Result<CanonicalTool> {
        let tool: Tool = serde_json::from_value(raw)?;
        Ok(tool_to_canonical(tool, &self.backend.name))
    }

    fn from_canonical(&self, tool: &CanonicalTool) -> Result<(Value, bool)> {
        let raw = serde_json::to_value(tool_from_canonical(tool))?;
        Ok((raw, is_lossy(tool, |feature| self.supports(feature))))
    }

    fn supports(&self, _feature: SchemaFeature) -> bool {
        // MCP tools carry their input/output schema through as opaque JSON
        // Schema; nothing about the wire format constrains which keywords
        // that schema may use.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolAnnotations;

    #[test]
    fn idempotent_hint_true_propagates() {
        let tool = Tool {
            name: "get_weather".into(),
            title: None,
            description: Some("Fetch current weather.\nSupports city names.".into()),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            annotations: Some(ToolAnnotations {
                idempotent_hint: Some(true),
                ..Default::default()
            }),
        };
        let canonical = tool_to_canonical(tool, "weather-server");
        assert!(canonical.idempotent);
        assert_eq!(canonical.summary, "Fetch current weather.");
        assert_eq!(canonical.qualified_id(), "weather-server:get_weather");
    }

    #[test]
    fn missing_annotations_default_to_non_idempotent() {
        let tool = Tool {
            name: "send_email".into(),
            title: None,
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            annotations: None,
        };
        let canonical = tool_to_canonical(tool, "gmail");
        assert!(!canonical.idempotent);
        assert_eq!(canonical.summary, "");
    }
}
