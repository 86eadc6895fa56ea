//! Idempotency key support for `gateway_invoke`
//!
//! Prevents duplicate side effects when LLMs retry tool calls due to timeouts.
//!
//! # How it works
//!
//! 1. Client supplies an optional `idempotency_key` in `gateway_invoke` arguments.
//! 2. For side-effecting tools without an explicit key, one is auto-generated from
//!    `SHA-256(tool_name || canonical_json(arguments))`.
//! 3. Before dispatch the key is looked up:
//!    - Not found → mark `InFlight`, execute, store `Completed`.
//!    - `InFlight` and not timed-out → return `Err(Error::DuplicateRequest)`.
//!    - `Completed` → return cached result immediately (no re-execution).
//! 4. A background task periodically evicts stale entries to bound memory usage.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Error, Result};

// ── Public constants ──────────────────────────────────────────────────────────

/// TTL for completed results (24 hours).
pub const COMPLETED_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout for in-flight markers (5 minutes).
///
/// If a tool call does not complete within this window the in-flight marker
/// is treated as stale and a new execution is allowed.
pub const IN_FLIGHT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ── State machine ─────────────────────────────────────────────────────────────

/// State of an idempotency entry.
#[derive(Debug, Clone)]
pub enum IdempotencyState {
    /// Tool call is currently executing.  Holds the instant it was registered.
    InFlight(Instant),
    /// Tool call completed successfully.  Holds the result and when it was stored.
    Completed(Value, Instant),
}

impl IdempotencyState {
    /// Return `true` when this entry is stale and should be evicted.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self {
            Self::InFlight(started) => started.elapsed() > IN_FLIGHT_TIMEOUT,
            Self::Completed(_, stored) => stored.elapsed() > COMPLETED_TTL,
        }
    }

    /// Return `true` when this is a live in-flight entry (not yet timed out).
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight(t) if t.elapsed() <= IN_FLIGHT_TIMEOUT)
    }
}

// ── IdempotencyCache ──────────────────────────────────────────────────────────

/// Thread-safe cache that tracks in-flight and completed idempotent requests.
///
/// All operations are O(1) amortised thanks to the underlying `DashMap`.
///
/// # Example
///
/// ```
/// use mcp_gateway::idempotency::IdempotencyCache;
/// use serde_json::json;
///
/// let cache = IdempotencyCache::new();
/// let key = "my-idempotency-key";
///
/// // Mark as in-flight before dispatching
/// cache.mark_in_flight(key);
///
/// // After the call completes, store the result
/// cache.mark_completed(key, json!({"status": "ok"}));
///
/// // Subsequent calls with the same key return the cached result
/// let result = cache.check(key);
/// assert!(result.is_some());
/// ```
#[derive(Debug, Default)]
pub struct IdempotencyCache {
    entries: DashMap<String, IdempotencyState>,
}

/// Outcome of checking the idempotency cache before executing a tool call.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Key not found (or stale in-flight) — proceed with execution.
    Proceed,
    /// A live in-flight entry exists — reject with 409.
    InFlight,
    /// A completed entry exists — return cached result.
    Completed(Value),
}

impl IdempotencyCache {
    /// Create a new, empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check the cache state for `key` and return what the caller should do.
    ///
    /// Stale in-flight entries (exceeded [`IN_FLIGHT_TIMEOUT`]) are evicted and
    /// treated as `Proceed` so a fresh execution can start.
    pub fn check(&self, key: &str) -> CheckOutcome {
        let Some(entry) = self.entries.get(key) else {
            return CheckOutcome::Proceed;
        };

        match entry.value() {
            IdempotencyState::InFlight(started) if started.elapsed() <= IN_FLIGHT_TIMEOUT => {
                CheckOutcome::InFlight
            }
            IdempotencyState::InFlight(_) => {
                // Stale in-flight — drop the guard before mutating
                drop(entry);
                self.entries.remove(key);
                debug!(key, "Evicted stale in-flight idempotency entry");
                CheckOutcome::Proceed
            }
            IdempotencyState::Completed(value, stored)
                if stored.elapsed() <= COMPLETED_TTL =>
            {
                CheckOutcome::Completed(value.clone())
            }
            IdempotencyState::Completed(_, _) => {
                // Expired completed entry
                drop(entry);
                self.entries.remove(key);
                debug!(key, "Evicted expired completed idempotency entry");
                CheckOutcome::Proceed
            }
        }
    }

    /// Register `key` as in-flight.  Overwrites any stale entry.
    pub fn mark_in_flight(&self, key: &str) {
        self.entries
            .insert(key.to_string(), IdempotencyState::InFlight(Instant::now()));
    }

    /// Transition `key` from in-flight to completed with `result`.
    pub fn mark_completed(&self, key: &str, result: Value) {
        self.entries.insert(
            key.to_string(),
            IdempotencyState::Completed(result, Instant::now()),
        );
    }

    /// Remove `key` entirely (used when a call fails and should be retryable).
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Evict all stale entries.  Called by the background maintenance task.
    pub fn evict_expired(&self) {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.value().is_expired().then(|| e.key().clone()))
            .collect();

        let count = stale.len();
        for key in stale {
            self.entries.remove(&key);
        }
        if count > 0 {
            debug!(count, "Evicted stale idempotency entries");
        }
    }

    /// Current number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Key generation ────────────────────────────────────────────────────────────

/// Derive an idempotency key from `tool_name` and `arguments`.
///
/// The key is the hex-encoded SHA-256 digest of
/// `"{tool_name}\0{canonical_json(arguments)}"`.
/// Using a NUL separator prevents collisions between tool names that share a
/// common prefix and arguments.
///
/// The resulting key is stable: identical `(tool_name, arguments)` pairs
/// always produce the same key regardless of JSON key ordering.
#[must_use]
pub fn derive_key(tool_name: &str, arguments: &Value) -> String {
    let canonical = serde_json::to_string(arguments).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ── Idempotency enforcement ───────────────────────────────────────────────────

/// Outcome of the idempotency guard.
#[derive(Debug)]
pub enum GuardOutcome {
    /// Proceed with execution; the key has been registered as in-flight.
    Proceed,
    /// Return the cached result — no execution needed.
    CachedResult(Value),
}

/// Check the idempotency cache and either return a cached result or register
/// the key as in-flight for execution.
///
/// # Errors
///
/// Returns [`Error::DuplicateRequest`] (HTTP 409 equivalent) when an identical
/// request is already in flight.
pub fn enforce(cache: &IdempotencyCache, key: &str) -> Result<GuardOutcome> {
    match cache.check(key) {
        CheckOutcome::Proceed => {
            cache.mark_in_flight(key);
            Ok(GuardOutcome::Proceed)
        }
        CheckOutcome::InFlight => Err(Error::json_rpc(
            409,
            format!("Duplicate request in progress for key: {key}"),
        )),
        CheckOutcome::Completed(value) => Ok(GuardOutcome::CachedResult(value)),
    }
}

/// Spawn a background tokio task that periodically evicts stale idempotency
/// entries from `cache`.
///
/// The task runs every `interval` and stops when the `Arc` reference count
/// drops to 1 (i.e., all other owners have dropped their handles).
pub fn spawn_cleanup_task(cache: Arc<IdempotencyCache>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            // Stop if we are the sole Arc holder (server is shutting down).
            if Arc::strong_count(&cache) <= 1 {
                break;
            }
            cache.evict_expired();
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
