//! Transport-agnostic JSON-RPC dispatch (C8): the one handler graph every
//! front-door transport — plain HTTP request/response, the chunked SSE
//! stream, and the length-framed stdio duplex — calls into. Identity,
//! policy, caching, and resilience all live one layer down in
//! [`crate::pipeline::Pipeline`]; this module only speaks JSON-RPC framing
//! and routes the handful of methods the gateway understands.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::Error;
use crate::canonical::CanonicalTool;
use crate::identity::Credentials;
use crate::pipeline::{Pipeline, ToolCall};
use crate::protocol::{
    Info, InitializeResult, JsonRpcResponse, PROTOCOL_VERSION, RequestId, ServerCapabilities,
    Tool, ToolsCapability, ToolsListResult, negotiate_version,
};
use crate::registry::SharedRegistry;

/// The result of dispatching one JSON-RPC envelope: either a response to
/// send back, or nothing, because the envelope was a notification.
pub enum RpcOutcome {
    /// A response to write back to the caller.
    Response(JsonRpcResponse),
    /// A notification method; no response is ever sent for these.
    Notification,
}

/// Resolves JSON-RPC methods against the registry and pipeline, shared by
/// every front-door transport.
pub struct RpcHandler {
    pipeline: std::sync::Arc<Pipeline>,
    registry: SharedRegistry,
    meta_mcp_enabled: bool,
}

impl RpcHandler {
    /// Build a handler over an assembled pipeline and registry.
    #[must_use]
    pub fn new(pipeline: std::sync::Arc<Pipeline>, registry: SharedRegistry, meta_mcp_enabled: bool) -> Self {
        Self { pipeline, registry, meta_mcp_enabled }
    }

    /// Dispatch one parsed JSON-RPC request or notification envelope.
    pub async fn dispatch(&self, credentials: &Credentials, request: &Value) -> RpcOutcome {
        let (id, method, params) = match parse_request(request) {
            Ok(parsed) => parsed,
            Err(response) => return RpcOutcome::Response(response),
        };

        if !self.meta_mcp_enabled {
            return RpcOutcome::Response(JsonRpcResponse::error(
                id,
                -32600,
                "this gateway is not running in meta-MCP mode".to_string(),
            ));
        }

        if is_notification_method(&method) {
            debug!(notification = %method, "handled notification");
            return RpcOutcome::Notification;
        }

        // id is guaranteed present for non-notification requests by parse_request.
        let id = id.expect("non-notification requests always carry an id");
        debug!(method = %method, "dispatching JSON-RPC request");

        let response = match method.as_str() {
            "initialize" => handle_initialize(id, params.as_ref()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => handle_tools_list(&self.registry, id),
            "tools/call" => handle_tools_call(&self.pipeline, credentials, id, params.as_ref()).await,
            other => JsonRpcResponse::error(Some(id), -32601, format!("method not found: {other}")),
        };
        RpcOutcome::Response(response)
    }
}

fn handle_initialize(id: RequestId, params: Option<&Value>) -> JsonRpcResponse {
    let requested = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(|v| v.as_str())
        .unwrap_or(PROTOCOL_VERSION);
    let result = InitializeResult {
        protocol_version: negotiate_version(requested).to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: true }),
            ..Default::default()
        },
        server_info: Info {
            name: "mcp-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("MCP Gateway".to_string()),
            description: None,
        },
        instructions: None,
    };
    JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
}

fn handle_tools_list(registry: &SharedRegistry, id: RequestId) -> JsonRpcResponse {
    let tools: Vec<Tool> = registry.all().into_iter().map(|entry| canonical_to_wire_tool(&entry.tool)).collect();
    let result = ToolsListResult { tools, next_cursor: None };
    JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
}

fn canonical_to_wire_tool(tool: &CanonicalTool) -> Tool {
    Tool {
        name: tool.qualified_id(),
        title: None,
        description: Some(tool.description.clone()),
        input_schema: tool.input_schema.clone(),
        output_schema: tool.output_schema.clone(),
        annotations: None,
    }
}

async fn handle_tools_call(
    pipeline: &Pipeline,
    credentials: &Credentials,
    id: RequestId,
    params: Option<&Value>,
) -> JsonRpcResponse {
    let name = params.and_then(|p| p.get("name")).and_then(|v| v.as_str()).unwrap_or("");
    let arguments = params.and_then(|p| p.get("arguments")).cloned().unwrap_or(json!({}));
    if name.is_empty() {
        return JsonRpcResponse::error(Some(id), -32602, "missing required field: name");
    }

    let idempotency_key = params
        .and_then(|p| p.get("_meta"))
        .and_then(|m| m.get("idempotencyKey"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let call = ToolCall { tool: name.to_string(), arguments, idempotency_key };
    match pipeline.handle(credentials, call).await {
        Ok(value) => {
            let content = vec![crate::protocol::Content::Text { text: value.to_string(), annotations: None }];
            let result = crate::protocol::ToolsCallResult { content, is_error: false };
            JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or(Value::Null))
        }
        Err(err) => tool_call_error(id, &err),
    }
}

fn tool_call_error(id: RequestId, err: &Error) -> JsonRpcResponse {
    if matches!(err.kind(), crate::error::ErrorKind::Internal | crate::error::ErrorKind::Configuration) {
        warn!(error = %err, "tool call failed");
    }
    JsonRpcResponse::error(Some(id), err.to_rpc_code(), err.to_string())
}

fn extract_request_id(value: &Value) -> Option<RequestId> {
    if let Some(s) = value.as_str() {
        Some(RequestId::String(s.to_string()))
    } else if let Some(n) = value.as_i64() {
        Some(RequestId::Number(n))
    } else {
        None
    }
}

fn is_notification_method(method: &str) -> bool {
    method.starts_with("notifications/")
}

/// Parse a JSON-RPC request or notification envelope.
///
/// Returns `(id, method, params)`; `id` is `None` only for notifications.
#[allow(clippy::result_large_err)]
fn parse_request(value: &Value) -> std::result::Result<(Option<RequestId>, String, Option<Value>), JsonRpcResponse> {
    if value.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return Err(JsonRpcResponse::error(None, -32600, "invalid or missing jsonrpc version"));
    }

    let id = value.get("id").and_then(extract_request_id);
    let method = value
        .get("method")
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcResponse::error(id.clone(), -32600, "missing method"))?;

    if !is_notification_method(method) && id.is_none() {
        return Err(JsonRpcResponse::error(None, -32600, "missing id"));
    }

    Ok((id, method.to_string(), value.get("params").cloned()))
}
