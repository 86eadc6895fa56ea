//! Playbook execution engine.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use super::{
    PlaybookDefinition, PlaybookContext, PlaybookResult, PlaybookStep,
    ToolInvoker, ErrorStrategy, evaluate_condition,
};
#[cfg(test)]
use super::{
    PlaybookOutput, OutputMapping,
    extract_var_refs, is_truthy,
};

/// Engine that loads and executes playbooks.
pub struct PlaybookEngine {
    definitions: HashMap<String, PlaybookDefinition>,
}

impl PlaybookEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Load playbooks from a directory (reads all `*.yaml` files).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn load_from_directory(&mut self, dir: &str) -> crate::Result<usize> {
        let path = Path::new(dir);
        if !path.is_dir() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path).map_err(|e| {
            crate::Error::Config(format!("Failed to read playbooks directory '{dir}': {e}"))
        })? {
            let entry = entry.map_err(|e| {
                crate::Error::Config(format!("Failed to read directory entry: {e}"))
            })?;

            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                match std::fs::read_to_string(&file_path) {
                    Ok(content) => match serde_yaml::from_str::<PlaybookDefinition>(&content) {
                        Ok(def) => {
                            debug!(name = %def.name, path = %file_path.display(), "Loaded playbook");
                            self.definitions.insert(def.name.clone(), def);
                            count += 1;
                        }
                        Err(e) => {
                            warn!(path = %file_path.display(), error = %e, "Failed to parse playbook");
                        }
                    },
                    Err(e) => {
                        warn!(path = %file_path.display(), error = %e, "Failed to read playbook file");
                    }
                }
            }
        }

        Ok(count)
    }

    /// Register a playbook definition directly.
    pub fn register(&mut self, definition: PlaybookDefinition) {
        self.definitions.insert(definition.name.clone(), definition);
    }

    /// Get a playbook definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PlaybookDefinition> {
        self.definitions.get(name)
    }

    /// List all playbook names.
    pub fn list(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    /// Get the number of loaded playbooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if there are no loaded playbooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Execute a playbook by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the playbook is not found, a step fails (with abort strategy),
    /// or the total timeout is exceeded.
    pub async fn execute(
        &self,
        name: &str,
        inputs: Value,
        invoker: &dyn ToolInvoker,
    ) -> crate::Result<PlaybookResult> {
        let definition = self.get(name).ok_or_else(|| {
            crate::Error::Config(format!("Playbook not found: {name}"))
        })?;

        Self::execute_definition(definition, inputs, invoker, None).await
    }

    /// Execute an ad-hoc chain of steps passed inline by the caller, rather
    /// than a named playbook loaded from YAML.
    ///
    /// Each entry of `steps` is a JSON object: `id` (a bare or
    /// `backend:tool`-qualified tool reference), `arguments` (static
    /// arguments), `input_mapper` (a map of argument name to a `$step.path`
    /// reference resolved against earlier steps' results, merged over
    /// `arguments`), and an optional per-step `on_error` ("abort",
    /// "continue", or "retry"). `max_steps` soft-caps how many steps run.
    ///
    /// # Errors
    ///
    /// Returns an error if a step's `id` is missing, or (per `on_error`)
    /// if a step fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_ad_hoc(
        steps: &[Value],
        inputs: Value,
        on_error: ErrorStrategy,
        max_retries: u32,
        timeout_secs: u64,
        max_steps: Option<usize>,
        invoker: &dyn ToolInvoker,
    ) -> crate::Result<PlaybookResult> {
        let mut parsed_steps = Vec::with_capacity(steps.len());
        for (index, raw) in steps.iter().enumerate() {
            let id = raw.get("id").and_then(Value::as_str).ok_or_else(|| {
                crate::Error::InvalidParams(format!("chain step {index} is missing 'id'"))
            })?;
            let (server, tool) = match id.split_once(':') {
                Some((s, t)) => (s.to_string(), t.to_string()),
                None => (String::new(), id.to_string()),
            };

            let mut arguments: HashMap<String, Value> = raw
                .get("arguments")
                .and_then(Value::as_object)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();

            if let Some(mapper) = raw.get("input_mapper").and_then(Value::as_object) {
                for (field, reference) in mapper {
                    arguments.insert(field.clone(), reference.clone());
                }
            }

            let step_on_error = raw
                .get("on_error")
                .and_then(Value::as_str)
                .and_then(|s| match s {
                    "abort" => Some(ErrorStrategy::Abort),
                    "continue" => Some(ErrorStrategy::Continue),
                    "retry" => Some(ErrorStrategy::Retry),
                    _ => None,
                });

            parsed_steps.push(PlaybookStep {
                name: format!("step{index}"),
                tool,
                server,
                arguments,
                condition: None,
                on_error: step_on_error,
            });
        }

        let definition = PlaybookDefinition {
            playbook: "1.0".to_string(),
            name: "ad_hoc".to_string(),
            description: "Ad-hoc chain passed inline by run_chain".to_string(),
            inputs: Value::Null,
            steps: parsed_steps,
            output: None,
            on_error,
            max_retries,
            timeout: timeout_secs,
        };

        Self::execute_definition(&definition, inputs, invoker, max_steps).await
    }

    /// Execute a playbook from its definition.
    ///
    /// `max_steps` soft-caps execution: once that many steps have been
    /// attempted (completed, skipped, or failed), the remaining steps are
    /// recorded as skipped rather than run.
    async fn execute_definition(
        definition: &PlaybookDefinition,
        inputs: Value,
        invoker: &dyn ToolInvoker,
        max_steps: Option<usize>,
    ) -> crate::Result<PlaybookResult> {
        let start = Instant::now();
        let timeout = std::time::Duration::from_secs(definition.timeout);
        let mut ctx = PlaybookContext::new(inputs);

        let mut steps_completed = Vec::new();
        let mut steps_skipped = Vec::new();
        let mut steps_failed = Vec::new();

        for (index, step) in definition.steps.iter().enumerate() {
            if let Some(limit) = max_steps {
                if index >= limit {
                    debug!(step = %step.name, limit, "Step skipped (max_steps reached)");
                    steps_skipped.push(step.name.clone());
                    continue;
                }
            }

            // Check timeout
            if start.elapsed() > timeout {
                return Err(crate::Error::Internal(format!(
                    "Playbook '{}' exceeded timeout of {}s",
                    definition.name, definition.timeout
                )));
            }

            // Evaluate condition
            if let Some(ref condition) = step.condition {
                if !evaluate_condition(condition, &ctx) {
                    debug!(step = %step.name, "Step skipped (condition false)");
                    steps_skipped.push(step.name.clone());
                    continue;
                }
            }

            // Interpolate arguments
            let arguments = ctx.interpolate(&Value::Object(
                step.arguments.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ));

            // Execute with retry
            let strategy = step.on_error.unwrap_or(definition.on_error);
            let mut last_error = None;
            let max_attempts = if strategy == ErrorStrategy::Retry {
                definition.max_retries.max(1)
            } else {
                1
            };

            let mut succeeded = false;
            for attempt in 0..max_attempts {
                if attempt > 0 {
                    debug!(step = %step.name, attempt, "Retrying step");
                }

                match invoker.invoke(&step.server, &step.tool, arguments.clone()).await {
                    Ok(result) => {
                        debug!(step = %step.name, "Step completed");
                        ctx.step_results.insert(step.name.clone(), result);
                        steps_completed.push(step.name.clone());
                        succeeded = true;
                        break;
                    }
                    Err(e) => {
                        warn!(step = %step.name, error = %e, "Step failed");
                        last_error = Some(e);
                    }
                }
            }

            if !succeeded {
                steps_failed.push(step.name.clone());
                match strategy {
                    ErrorStrategy::Abort => {
                        return Err(last_error.unwrap_or_else(|| {
                            crate::Error::Internal(format!(
                                "Step '{}' failed in playbook '{}'",
                                step.name, definition.name
                            ))
                        }));
                    }
                    ErrorStrategy::Continue | ErrorStrategy::Retry => {
                        // Already retried if Retry; continue to next step.
                        ctx.step_results.insert(step.name.clone(), Value::Null);
                    }
                }
            }
        }

        // Build output
        let output = build_output(definition, &ctx);
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(PlaybookResult {
            output,
            steps_completed,
            steps_skipped,
            steps_failed,
            duration_ms,
        })
    }
}

impl Default for PlaybookEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the final output from output mappings or raw step results.
fn build_output(definition: &PlaybookDefinition, ctx: &PlaybookContext) -> Value {
    let Some(ref output_def) = definition.output else {
        // No output mapping: return all step results.
        return Value::Object(
            ctx.step_results
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
    };

    let mut result = serde_json::Map::new();
    for (prop_name, mapping) in &output_def.properties {
        let resolved = ctx.resolve_var(&mapping.path);
        if resolved.is_null() {
            if let Some(ref fallback) = mapping.fallback {
                result.insert(prop_name.clone(), fallback.clone());
            } else {
                result.insert(prop_name.clone(), Value::Null);
            }
        } else {
            result.insert(prop_name.clone(), resolved);
        }
    }
    Value::Object(result)
}

// ============================================================================
// Tests
// ============================================================================
