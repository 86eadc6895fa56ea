//! HTTP router and JSON-RPC handlers (C8 transport layer, HTTP front door).

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::{debug, info};

use super::rpc::{RpcHandler, RpcOutcome};
use super::streaming::{NotificationMultiplexer, create_sse_response};
use crate::config::Config;
use crate::docstore::SharedStore;
use crate::identity::Credentials;
use crate::protocol::JsonRpcResponse;
use crate::registry::SharedRegistry;

/// Shared application state handed to every axum handler.
struct AppState {
    rpc: Arc<RpcHandler>,
    multiplexer: Arc<NotificationMultiplexer>,
    registry: SharedRegistry,
    docstore: SharedStore,
    streaming: crate::config::StreamingConfig,
}

/// Assemble the gateway's HTTP router.
///
/// The caller (`Gateway::run`) owns the listener; this only wires routes,
/// middleware, and the shared state every handler closes over.
#[must_use]
pub fn build_router(
    rpc: Arc<RpcHandler>,
    multiplexer: Arc<NotificationMultiplexer>,
    registry: SharedRegistry,
    docstore: SharedStore,
    config: &Config,
) -> Router {
    let state = Arc::new(AppState {
        rpc,
        multiplexer,
        registry,
        docstore,
        streaming: config.streaming.clone(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/mcp",
            axum::routing::post(mcp_handler)
                .get(mcp_sse_handler)
                .delete(mcp_delete_handler),
        )
        .route("/mcp/docs/{qualified_id}", get(docs_handler))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health` - liveness and a coarse view of registered tool counts.
///
/// Never requires authentication; never leaks backend topology, only
/// aggregate counts, so it is safe to expose to load balancers.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let namespaces = state.registry.namespaces();
    let tool_count = state.registry.all().len();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "namespaces": namespaces,
        "tool_count": tool_count,
    }))
}

/// `GET /mcp` - SSE stream of server-to-client notifications.
async fn mcp_sse_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if !state.streaming.enabled {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({
                "jsonrpc": "2.0",
                "error": {"code": -32600, "message": "streaming is not enabled; POST JSON-RPC requests to /mcp"},
                "id": null,
            })),
        )
            .into_response();
    }

    let accept = headers.get("accept").and_then(|v| v.to_str().ok()).unwrap_or("");
    if !accept.contains("text/event-stream") {
        return (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({"error": "Accept: text/event-stream is required for the notification stream"})),
        )
            .into_response();
    }

    let existing_session_id = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let last_event_id = headers.get("last-event-id").and_then(|v| v.to_str().ok()).map(String::from);

    let (session_id, _rx) = state.multiplexer.get_or_create_session(existing_session_id.as_deref());
    info!(session_id = %session_id, "client connected to notification stream");

    let multiplexer = state.multiplexer.clone();
    let sid = session_id.clone();
    tokio::spawn(async move {
        multiplexer.auto_subscribe(&sid).await;
    });

    let keep_alive = state.streaming.keep_alive_interval;
    match create_sse_response(state.multiplexer.clone(), session_id.clone(), last_event_id, keep_alive) {
        Some(sse) => {
            let mut response = sse.into_response();
            if let Ok(value) = session_id.parse() {
                response.headers_mut().insert("mcp-session-id", value);
            }
            response
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "failed to open notification stream"})))
            .into_response(),
    }
}

/// `DELETE /mcp` - explicit session termination.
async fn mcp_delete_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    match headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) {
        Some(id) if state.multiplexer.has_session(id) => {
            state.multiplexer.remove_session(id);
            info!(session_id = %id, "session terminated by client");
            StatusCode::NO_CONTENT
        }
        Some(id) => {
            debug!(session_id = %id, "session not found for termination");
            StatusCode::NOT_FOUND
        }
        None => StatusCode::BAD_REQUEST,
    }
}

/// `GET /mcp/docs/{qualified_id}?level=summary|schema|full` - a plain-HTTP
/// window onto the same progressive-disclosure documentation
/// `describe_tool` exposes over JSON-RPC, for tooling that would rather
/// curl a tool's schema than speak JSON-RPC to fetch it.
async fn docs_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(qualified_id): axum::extract::Path<String>,
    axum::extract::Query(query): axum::extract::Query<std::collections::HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(record) = state.docstore.get(&qualified_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": format!("unknown tool: {qualified_id}")}))).into_response();
    };

    let level = match query.get("level").map(String::as_str) {
        Some("full") => crate::docstore::Disclosure::Full,
        Some("schema") => crate::docstore::Disclosure::Schema,
        _ => crate::docstore::Disclosure::Summary,
    };
    Json(record.render(level)).into_response()
}

/// `POST /mcp` - the JSON-RPC entry point every tool call and handshake
/// message arrives through. Parses the HTTP-specific envelope (body bytes,
/// bearer/tenant headers) and hands the rest to [`RpcHandler`], the same
/// dispatcher the stdio front door uses.
async fn mcp_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(None, -32700, format!("invalid JSON: {e}"))),
            )
                .into_response();
        }
    };

    let credentials = extract_credentials(&headers);
    match state.rpc.dispatch(&credentials, &request).await {
        RpcOutcome::Response(response) => Json(response).into_response(),
        RpcOutcome::Notification => (StatusCode::ACCEPTED, Json(json!({}))).into_response(),
    }
}

fn extract_credentials(headers: &HeaderMap) -> Credentials {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let tenant_header = headers.get("x-tenant-id").and_then(|v| v.to_str().ok()).map(str::to_string);
    Credentials { bearer, client_cert_der: None, tenant_header }
}
