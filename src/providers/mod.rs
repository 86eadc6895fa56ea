//! Built-in tool providers.
//!
//! Seven tools are always registered under the `local` pseudo-backend:
//! `search_tools`, `describe_tool`, `run_tool`, `run_chain`,
//! `list_namespaces`, `list_tool_examples`, and `execute_code`. They run
//! through the same pipeline as any backend-sourced tool, so identity,
//! policy, rate limiting, and caching apply uniformly to them.

mod sandbox;

pub use sandbox::{CodeSandbox, ProcessSandbox, SandboxOutput};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::docstore::{Disclosure, SharedStore};
use crate::playbook::{PlaybookEngine, ToolInvoker};
use crate::registry::{SharedRegistry, SubstringSelector};
use crate::{Error, Result};

/// Dispatches a resolved, backend-qualified tool call to its owning adapter.
///
/// [`BuiltinProviders`] never talks to adapters directly; it asks a
/// dispatcher to do it, the same indirection the registry uses to keep tool
/// metadata decoupled from the adapters that serve it.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Invoke the tool already resolved to `backend:tool` against the
    /// adapter that owns `backend`.
    async fn invoke(&self, qualified_id: &str, arguments: Value) -> Result<Value>;
}

/// Adapts a [`ToolDispatcher`] and the registry's name resolution into the
/// playbook engine's `ToolInvoker` contract, so `run_chain` steps can name
/// tools the same way `run_tool` callers do (bare or qualified).
struct RegistryInvoker<'a> {
    registry: &'a SharedRegistry,
    dispatcher: &'a dyn ToolDispatcher,
}

#[async_trait]
impl ToolInvoker for RegistryInvoker<'_> {
    async fn invoke(&self, server: &str, tool: &str, arguments: Value) -> Result<Value> {
        let reference = if server.is_empty() || server == "capabilities" {
            tool.to_string()
        } else {
            format!("{server}:{tool}")
        };
        let entry = self
            .registry
            .resolve(&reference)
            .ok_or_else(|| Error::NotFound(format!("tool not found: {reference}")))?;
        self.dispatcher
            .invoke(&entry.tool.qualified_id(), arguments)
            .await
    }
}

/// The seven built-in tools, backed by the registry, docstore, chain
/// engine, and code sandbox they each need.
pub struct BuiltinProviders {
    registry: SharedRegistry,
    docstore: SharedStore,
    chains: PlaybookEngine,
    sandbox: Arc<dyn CodeSandbox>,
    dispatcher: Arc<dyn ToolDispatcher>,
    max_chain_steps: usize,
}

impl BuiltinProviders {
    /// Assemble the built-in tool surface from its shared dependencies.
    /// `max_chain_steps` (from `ExecutionConfig`) caps an ad-hoc `run_chain`
    /// call that doesn't specify its own `max_steps`.
    #[must_use]
    pub fn new(
        registry: SharedRegistry,
        docstore: SharedStore,
        chains: PlaybookEngine,
        sandbox: Arc<dyn CodeSandbox>,
        dispatcher: Arc<dyn ToolDispatcher>,
        max_chain_steps: usize,
    ) -> Self {
        Self {
            registry,
            docstore,
            chains,
            sandbox,
            dispatcher,
            max_chain_steps,
        }
    }

    /// `search_tools`: rank registered tools against a free-text query.
    #[must_use]
    pub fn search_tools(&self, query: &str) -> Vec<Value> {
        self.registry
            .search(query, &SubstringSelector)
            .into_iter()
            .map(|entry| {
                serde_json::json!({
                    "id": entry.tool.qualified_id(),
                    "summary": entry.tool.summary,
                })
            })
            .collect()
    }

    /// `describe_tool`: render one tool's documentation at the requested
    /// disclosure level.
    pub fn describe_tool(&self, tool: &str, level: Disclosure) -> Result<Value> {
        let entry = self
            .registry
            .resolve(tool)
            .ok_or_else(|| Error::NotFound(format!("tool not found: {tool}")))?;
        let qualified = entry.tool.qualified_id();
        let record = self
            .docstore
            .get(&qualified)
            .ok_or_else(|| Error::NotFound(format!("no documentation for tool: {qualified}")))?;
        Ok(record.render(level))
    }

    /// `run_tool`: resolve a bare or qualified tool reference and invoke it.
    pub async fn run_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        let entry = self
            .registry
            .resolve(tool)
            .ok_or_else(|| Error::NotFound(format!("tool not found: {tool}")))?;
        self.dispatcher
            .invoke(&entry.tool.qualified_id(), arguments)
            .await
    }

    /// `run_chain`: execute either a named, registered chain (`chain` +
    /// `inputs`) or an ad-hoc ordered list of steps passed inline (`steps`,
    /// each `{id, arguments, input_mapper, on_error}`, plus an optional
    /// `max_steps`). Either way, every step's tool reference is resolved
    /// through the registry before dispatch.
    pub async fn run_chain(&self, chain: Option<&str>, arguments: &Value) -> Result<Value> {
        let invoker = RegistryInvoker {
            registry: &self.registry,
            dispatcher: self.dispatcher.as_ref(),
        };
        let inputs = arguments.get("inputs").cloned().unwrap_or(Value::Null);

        let result = if let Some(chain) = chain {
            self.chains.execute(chain, inputs, &invoker).await?
        } else {
            let steps = arguments
                .get("steps")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::InvalidParams("run_chain requires 'chain' or 'steps'".to_string()))?;
            let on_error = match arguments.get("on_error").and_then(Value::as_str) {
                Some("continue") => crate::playbook::ErrorStrategy::Continue,
                Some("retry") => crate::playbook::ErrorStrategy::Retry,
                _ => crate::playbook::ErrorStrategy::Abort,
            };
            let max_retries = arguments
                .get("max_retries")
                .and_then(Value::as_u64)
                .map_or(1, |n| n as u32);
            let timeout_secs = arguments
                .get("timeout")
                .and_then(Value::as_u64)
                .unwrap_or(60);
            let max_steps = arguments
                .get("max_steps")
                .and_then(Value::as_u64)
                .map_or(Some(self.max_chain_steps), |n| Some(n as usize));

            PlaybookEngine::execute_ad_hoc(
                steps,
                inputs,
                on_error,
                max_retries,
                timeout_secs,
                max_steps,
                &invoker,
            )
            .await?
        };

        Ok(serde_json::json!({
            "output": result.output,
            "steps_completed": result.steps_completed,
            "steps_skipped": result.steps_skipped,
            "steps_failed": result.steps_failed,
            "duration_ms": result.duration_ms,
        }))
    }

    /// `list_namespaces`: every backend name with at least one registered
    /// tool.
    #[must_use]
    pub fn list_namespaces(&self) -> Vec<String> {
        self.registry.namespaces()
    }

    /// `list_tool_examples`: the worked examples from a tool's full
    /// documentation view.
    pub fn list_tool_examples(&self, tool: &str) -> Result<Vec<Value>> {
        let entry = self
            .registry
            .resolve(tool)
            .ok_or_else(|| Error::NotFound(format!("tool not found: {tool}")))?;
        let qualified = entry.tool.qualified_id();
        let record = self
            .docstore
            .get(&qualified)
            .ok_or_else(|| Error::NotFound(format!("no documentation for tool: {qualified}")))?;
        Ok(record.full.examples)
    }

    /// `execute_code`: run source through the configured sandbox.
    pub async fn execute_code(
        &self,
        language: &str,
        source: &str,
        stdin: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Value> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(10).min(120));
        let output = self.sandbox.run(language, source, stdin, timeout).await?;
        Ok(serde_json::json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exit_code": output.exit_code,
        }))
    }
}
