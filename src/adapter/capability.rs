//! Adapter over YAML-declared REST capabilities.
//!
//! Not every tool source speaks the canonical backend protocol; some are
//! plain REST APIs described by a `CapabilityDefinition`. This adapter turns
//! those into the same [`Adapter`] contract every other tool source uses, so
//! the registry, pipeline, and providers never special-case REST tools.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::canonical::{CanonicalTool, ToolExample, ToolId, ToolOrigin};
use crate::capability::CapabilityBackend;
use crate::protocol::Tool;

use super::{Adapter, SchemaFeature, is_lossy};

/// The adapter tag recorded in [`CanonicalTool::source_format`] for every
/// tool declared through a YAML capability definition.
pub const SOURCE_FORMAT: &str = "capability";

/// Convert a capability's synthesized `Tool` record into the canonical
/// shape, tagging its origin with the owning capability name.
#[must_use]
pub fn tool_to_canonical(tool: Tool, capability: &str) -> CanonicalTool {
    let description = tool.description.clone().unwrap_or_default();
    let summary = description
        .lines()
        .next()
        .unwrap_or(&description)
        .to_string();

    CanonicalTool {
        id: ToolId::new(tool.name),
        summary,
        description,
        input_schema: tool.input_schema,
        output_schema: tool.output_schema,
        origin: ToolOrigin::Capability {
            capability: capability.to_string(),
        },
        // REST capabilities declare no idempotency hint today; treat as
        // side-effecting until a capability definition adds one.
        idempotent: false,
        examples: Vec::<ToolExample>::new(),
        tags: vec!["capability".to_string(), capability.to_string()],
        required_scopes: vec![],
        version: "1.0.0".to_string(),
        source_format: SOURCE_FORMAT.to_string(),
        source_metadata: serde_json::json!({}),
    }
}

/// Reverse of [`tool_to_canonical`]: rebuild the synthesized `Tool` record a
/// capability definition's REST provider was declared under.
#[must_use]
pub fn tool_from_canonical(tool: &CanonicalTool) -> Tool {
    Tool {
        name: tool.id.as_str().to_string(),
        title: None,
        description: Some(tool.description.clone()),
        input_schema: tool.input_schema.clone(),
        output_schema: tool.output_schema.clone(),
        annotations: None,
    }
}

/// Wraps a [`CapabilityBackend`] (one or more YAML capability definitions)
/// as a tool adapter.
pub struct CapabilityAdapter {
    backend: CapabilityBackend,
}

impl CapabilityAdapter {
    /// Wrap an already-loaded capability backend.
    #[must_use]
    pub fn new(backend: CapabilityBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Adapter for CapabilityAdapter {
    fn name(&self) -> &str {
        &self.backend.name
    }

    async fn list_tools(&self) -> Result<Vec<CanonicalTool>> {
        Ok(self
            .backend
            .get_tools()
            .into_iter()
            .map(|t| tool_to_canonical(t, &self.backend.name))
            .collect())
    }

    async fn invoke(&self, tool_id: &str, arguments: Value, _idempotent: bool) -> Result<Value> {
        let result = self.backend.call_tool(tool_id, arguments).await?;
        serde_json::to_value(result).map_err(Into::into)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }

    fn to_canonical(&self, raw: Value) -> Result<CanonicalTool> {
        let tool: Tool = serde_json::from_value(raw)?;
        Ok(tool_to_canonical(tool, &self.backend.name))
    }

    fn from_canonical(&self, tool: &CanonicalTool) -> Result<(Value, bool)> {
        let raw = serde_json::to_value(tool_from_canonical(tool))?;
        Ok((raw, is_lossy(tool, |feature| self.supports(feature))))
    }

    fn supports(&self, feature: SchemaFeature) -> bool {
        // REST providers substitute arguments into URL/header/body templates
        // through a flat `HashMap<String, String>` (`RestConfig::params`,
        // `param_map`), so only scalar-valued schema features round-trip;
        // anything that requires structure (nesting, arrays, `$ref`
        // indirection, schema unions) cannot be expressed by the
        // substitution model and gets stripped.
        matches!(
            feature,
            SchemaFeature::Enums
                | SchemaFeature::PatternValidation
                | SchemaFeature::Nullable
                | SchemaFeature::DefaultValues
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_origin_is_never_treated_as_idempotent_by_default() {
        let tool = Tool {
            name: "get_rates".into(),
            title: None,
            description: Some("Fetch current exchange rates.".into()),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
            annotations: None,
        };
        let canonical = tool_to_canonical(tool, "finance");
        assert!(!canonical.idempotent);
        assert_eq!(canonical.qualified_id(), "finance:get_rates");
    }
}
