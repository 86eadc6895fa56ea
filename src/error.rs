//! Error types for MCP Gateway

use std::io;

use thiserror::Error;

/// Result type alias for MCP Gateway
pub type Result<T> = std::result::Result<T, Error>;

/// MCP Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend not found
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// The tool exists but every backend that could serve it is currently
    /// unhealthy (registry `select_backend` returned none). Distinct from
    /// [`Self::BackendNotFound`], which means the namespace itself is unknown.
    #[error("No healthy backend available for: {0}")]
    NoHealthyBackend(String),

    /// Referenced tool, namespace, or chain does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request parameters failed schema or type validation.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Well-formed request the gateway will not process as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Caller did not present valid credentials.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller is authenticated but lacks permission for this operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller exceeded a per-key rate limit (distinct from a tenant's quota).
    #[error("Rate limited: {message} (retry after {retry_after_secs}s)")]
    RateLimited {
        /// Human-readable detail.
        message: String,
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// A tenant's daily/monthly/per-tool quota window is exhausted.
    #[error("Quota exhausted: {message} (retry after {retry_after_secs}s)")]
    QuotaExhausted {
        /// Human-readable detail.
        message: String,
        /// Seconds until the quota window resets.
        retry_after_secs: u64,
    },

    /// An idempotent retry collided with an in-flight or duplicate request.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend unavailable (circuit open)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Backend timeout
    #[error("Backend timeout: {0}")]
    BackendTimeout(String),

    /// A bulkhead or circuit breaker rejected the call because it is
    /// saturated, rather than queuing it past the caller's deadline.
    #[error("Overloaded: {message} (retry after {retry_after_secs}s)")]
    Overloaded {
        /// Human-readable detail.
        message: String,
        /// Suggested backoff before the caller retries.
        retry_after_secs: u64,
    },

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        /// Error code
        code: i32,
        /// Error message
        message: String,
        /// Optional data
        data: Option<serde_json::Value>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server shutdown
    #[error("Server shutdown")]
    Shutdown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a JSON-RPC error
    pub fn json_rpc(code: i32, message: impl Into<String>) -> Self {
        Self::JsonRpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::JsonRpc { code, .. } => *code,
            Self::Json(_) => -32700,     // Parse error
            Self::Protocol(_) => -32600, // Invalid request
            Self::BackendNotFound(_) | Self::NoHealthyBackend(_) => -32001,
            Self::NotFound(_) => -32601,
            Self::BackendUnavailable(_) | Self::Overloaded { .. } => -32000,
            Self::BackendTimeout(_) => -32000,
            Self::Transport(_) => -32000,
            Self::InvalidParams(_) => -32602,
            Self::InvalidRequest(_) => -32600,
            Self::Unauthenticated(_) => 401,
            Self::Unauthorized(_) => 403,
            Self::RateLimited { .. } | Self::QuotaExhausted { .. } => 429,
            Self::Conflict(_) => 409,
            _ => -32603, // Internal error
        }
    }

    /// Seconds the caller should wait before retrying, for the taxonomy
    /// entries §7 requires to carry a `retry-after` hint.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs, .. }
            | Self::QuotaExhausted { retry_after_secs, .. }
            | Self::Overloaded { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Classify this error into the gateway's error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Internal(_) => ErrorKind::InternalError,
            Self::BackendNotFound(_) | Self::NoHealthyBackend(_) => ErrorKind::NoBackendAvailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BackendUnavailable(_) | Self::Overloaded { .. } => ErrorKind::Overloaded,
            Self::BackendTimeout(_) => ErrorKind::DeadlineExceeded,
            Self::Transport(_) => ErrorKind::BackendError,
            Self::Protocol(_) | Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidParams(_) => ErrorKind::InvalidArgument,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Unauthorized(_) => ErrorKind::Forbidden,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::QuotaExhausted { .. } => ErrorKind::QuotaExhausted,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::JsonRpc { code, .. } => match *code {
                -32700 => ErrorKind::ParseError,
                -32600 => ErrorKind::InvalidRequest,
                -32601 => ErrorKind::NotFound,
                -32602 => ErrorKind::InvalidArgument,
                409 => ErrorKind::Conflict,
                401 => ErrorKind::Unauthenticated,
                403 => ErrorKind::Forbidden,
                429 => ErrorKind::RateLimited,
                _ => ErrorKind::InternalError,
            },
            Self::Io(_) => ErrorKind::BackendError,
            Self::Json(_) => ErrorKind::ParseError,
            Self::Http(_) => ErrorKind::BackendError,
            Self::Shutdown => ErrorKind::Overloaded,
        }
    }

    /// Whether this error represents a condition safe to retry automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited
                | ErrorKind::QuotaExhausted
                | ErrorKind::Overloaded
                | ErrorKind::NoBackendAvailable
                | ErrorKind::BackendError
        )
    }
}

/// The gateway's error taxonomy, independent of any single transport's wire
/// encoding. Every error surfaced to a caller, regardless of which transport
/// carried the request, is classified into exactly one of these kinds.
///
/// The twelve variants through [`Self::InternalError`] are the
/// specification's stable, end-to-end taxonomy codes; `ParseError` and
/// `InvalidRequest` are additional pre-dispatch kinds for malformed JSON-RPC
/// envelopes that never reach a resolved tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Schema or semantic validation failure.
    InvalidArgument,
    /// No valid identity.
    Unauthenticated,
    /// Authorized identity lacks permission.
    Forbidden,
    /// Tool id or entity unknown.
    NotFound,
    /// Precondition/version mismatch.
    Conflict,
    /// Tenant quota window exceeded.
    QuotaExhausted,
    /// Per-key rate limit exceeded.
    RateLimited,
    /// Request deadline elapsed.
    DeadlineExceeded,
    /// Bulkhead or circuit open.
    Overloaded,
    /// No healthy backend for tool.
    NoBackendAvailable,
    /// Downstream backend returned an error.
    BackendError,
    /// Unexpected fault.
    InternalError,
    /// Malformed request body; the payload could not be parsed at all.
    ParseError,
    /// Well-formed but semantically invalid request.
    InvalidRequest,
}

impl ErrorKind {
    /// Map this error kind to the HTTP status code transports should report.
    #[must_use]
    pub fn to_http_status(self) -> u16 {
        match self {
            Self::ParseError | Self::InvalidRequest | Self::InvalidArgument => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::QuotaExhausted | Self::RateLimited => 429,
            Self::DeadlineExceeded => 504,
            Self::Overloaded | Self::NoBackendAvailable => 503,
            Self::BackendError => 502,
            Self::InternalError => 500,
        }
    }

    /// Stable lowercase, dash-separated label for logs and API responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid-argument",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::QuotaExhausted => "quota-exhausted",
            Self::RateLimited => "rate-limited",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Overloaded => "overloaded",
            Self::NoBackendAvailable => "no-backend-available",
            Self::BackendError => "backend-error",
            Self::InternalError => "internal-error",
            Self::ParseError => "parse-error",
            Self::InvalidRequest => "invalid-request",
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error range start
    pub const SERVER_ERROR_START: i32 = -32000;
    /// Server error range end
    pub const SERVER_ERROR_END: i32 = -32099;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_maps_to_503() {
        assert_eq!(ErrorKind::Overloaded.to_http_status(), 503);
    }

    #[test]
    fn rate_limited_maps_to_429_and_is_retryable() {
        let err = Error::json_rpc(429, "too many requests");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.kind().to_http_status(), 429);
        assert!(err.is_retryable());
    }

    #[test]
    fn deadline_exceeded_is_not_auto_retried_no_backend_available_is() {
        let timeout = Error::BackendTimeout("slow".into());
        assert_eq!(timeout.kind(), ErrorKind::DeadlineExceeded);
        assert!(!timeout.is_retryable());
        let no_backend = Error::BackendNotFound("ghost".into());
        assert_eq!(no_backend.kind(), ErrorKind::NoBackendAvailable);
        assert!(no_backend.is_retryable());
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = Error::json_rpc(409, "duplicate");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.kind().to_http_status(), 409);
    }

    #[test]
    fn quota_exhausted_carries_retry_after_and_is_retryable() {
        let err = Error::QuotaExhausted { message: "daily cap hit".into(), retry_after_secs: 3_600 };
        assert_eq!(err.kind(), ErrorKind::QuotaExhausted);
        assert_eq!(err.kind().to_http_status(), 429);
        assert_eq!(err.retry_after_secs(), Some(3_600));
        assert!(err.is_retryable());
    }

    #[test]
    fn overloaded_carries_retry_after_and_is_distinct_from_rate_limited() {
        let err = Error::Overloaded { message: "bulkhead saturated".into(), retry_after_secs: 1 };
        assert_eq!(err.kind(), ErrorKind::Overloaded);
        assert_ne!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after_secs(), Some(1));
    }
}
