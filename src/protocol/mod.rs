//! MCP Protocol types (version 2024-11-05)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// MCP Protocol version
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Every protocol version this gateway can speak, newest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["2024-11-05", "2024-10-07"];

/// Negotiate a protocol version against a client's requested version.
///
/// Returns the requested version verbatim when it is one this gateway
/// speaks; otherwise falls back to [`PROTOCOL_VERSION`], the same
/// "unknown version -> latest" rule the MCP initialize handshake uses.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_VERSIONS
        .iter()
        .find(|&&v| v == requested)
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}
