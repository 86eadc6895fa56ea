//! Failsafe mechanisms: circuit breaker, retry, rate limiting

mod bulkhead;
mod circuit_breaker;
pub mod health;
mod rate_limiter;
mod retry;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use health::{HealthMetrics, HealthTracker};
pub use rate_limiter::{KeyedRateLimiter, RateLimiter};
pub use retry::{RetryPolicy, with_retry};

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::{CircuitBreakerConfig, FailsafeConfig};

/// The breaker key used for backend-level calls that are not scoped to a
/// single tool (`tools/list`, `resources/list`, health probes, ...).
const BACKEND_LEVEL_KEY: &str = "__backend__";

/// Combined failsafe wrapper for backends.
///
/// The circuit breaker is keyed per `(backend, tool)` pair (specification
/// §4.8), lazily creating one [`CircuitBreaker`] per tool name the first
/// time it is asked about, the same lazy-`DashMap` idiom
/// [`Bulkhead`](crate::failsafe::Bulkhead) and
/// `identity::quota::QuotaStore` use for their own per-key state. Rate
/// limiting and retry stay backend-wide: the specification only names a
/// per-(backend, tool) key for the breaker.
#[derive(Clone)]
pub struct Failsafe {
    name: String,
    cb_config: CircuitBreakerConfig,
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    /// Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
    /// Retry policy
    pub retry_policy: RetryPolicy,
}

impl Failsafe {
    /// Create a new failsafe from configuration
    #[must_use]
    pub fn new(name: &str, config: &FailsafeConfig) -> Self {
        Self {
            name: name.to_string(),
            cb_config: config.circuit_breaker.clone(),
            breakers: Arc::new(DashMap::new()),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            retry_policy: RetryPolicy::new(&config.retry),
        }
    }

    /// The circuit breaker guarding `tool` on this backend, created on first
    /// use. Pass [`None`] for calls not scoped to a single tool.
    #[must_use]
    pub fn breaker(&self, tool: Option<&str>) -> Arc<CircuitBreaker> {
        let key = tool.unwrap_or(BACKEND_LEVEL_KEY);
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(&format!("{}:{key}", self.name), &self.cb_config))
            })
            .clone()
    }

    /// Check if requests for `tool` can proceed.
    #[must_use]
    pub fn can_proceed(&self, tool: Option<&str>) -> bool {
        self.breaker(tool).can_proceed() && self.rate_limiter.try_acquire()
    }

    /// Record a success for `tool`'s breaker.
    pub fn record_success(&self, tool: Option<&str>) {
        self.breaker(tool).record_success();
    }

    /// Record a failure for `tool`'s breaker.
    pub fn record_failure(&self, tool: Option<&str>) {
        self.breaker(tool).record_failure();
    }

    /// Snapshot every tool-scoped breaker's state, for status reporting.
    #[must_use]
    pub fn breaker_states(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }
}
