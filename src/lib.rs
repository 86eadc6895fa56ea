//! MCP Gateway Library
//!
//! A tool-aggregation gateway that fronts a heterogeneous set of Model
//! Context Protocol backends (stdio/HTTP JSON-RPC tool-servers, in-process
//! handlers, declaratively-configured REST capabilities) behind a single,
//! protocol-neutral surface: seven built-in tools (`search_tools`,
//! `describe_tool`, `run_tool`, `run_chain`, `list_namespaces`,
//! `list_tool_examples`, `execute_code`) that let a caller discover and
//! invoke any registered tool without needing to know which backend it
//! lives on.
//!
//! # Features
//!
//! - **Progressive disclosure**: `describe_tool` returns one of three
//!   nested views (`summary`, `schema`, `full`), each independently cached
//!   and TTL'd.
//! - **Priority-ordered routing**: bare tool names route to the
//!   highest-priority healthy backend; a backend-qualified id always
//!   addresses that specific backend.
//! - **Streaming**: real-time notifications via SSE (MCP 2025-03-26
//!   Streamable HTTP).
//! - **Multi-transport**: stdio, Streamable HTTP, SSE.
//! - **Failsafes**: circuit breakers, idempotence-aware retries with full
//!   jitter, per-backend bulkheads, rate limiting.
//! - **Identity and tenancy**: pluggable authentication, role-based
//!   authorization, tenant-scoped policy and quota.
//! - **Response caching**: content-addressable, identity/tenant-scoped for
//!   non-shareable tools, with single-flight coalescing.
//!
//! # Protocol Version
//!
//! Implements MCP protocol versions 2024-11-05 and 2025-03-26 (Streamable HTTP).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod backend;
pub mod cache;
pub mod canonical;
pub mod capability;
pub mod cli;
pub mod config;
pub mod docstore;
pub mod error;
pub mod failsafe;
pub mod gateway;
pub mod idempotency;
pub mod identity;
pub mod mtls;
pub mod oauth;
pub mod observability;
pub mod pipeline;
pub mod playbook;
pub mod protocol;
pub mod providers;
pub mod registry;
pub mod security;
pub mod transform;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// MCP Protocol version supported by this gateway
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
