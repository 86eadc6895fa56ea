//! Rate limiting implementation

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovernorLimiter};
use parking_lot::Mutex;

use crate::config::RateLimitConfig;
use crate::{Error, Result};

type DirectLimiter =
    GovernorLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Rate limiter for request throttling
pub struct RateLimiter {
    /// Whether rate limiting is enabled
    enabled: AtomicBool,
    /// Internal rate limiter (lazy initialized)
    inner: Mutex<
        Option<
            GovernorLimiter<
                governor::state::NotKeyed,
                governor::state::InMemoryState,
                governor::clock::DefaultClock,
            >,
        >,
    >,
    /// Quota configuration
    rps: u32,
    burst: u32,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            inner: Mutex::new(None),
            rps: config.requests_per_second,
            burst: config.burst_size,
        }
    }

    /// Try to acquire a permit
    pub fn try_acquire(&self) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return true;
        }

        let mut inner = self.inner.lock();
        let limiter = inner.get_or_insert_with(|| {
            let quota = Quota::per_second(NonZeroU32::new(self.rps).unwrap_or(NonZeroU32::MIN))
                .allow_burst(NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN));
            GovernorLimiter::direct(quota)
        });

        limiter.check().is_ok()
    }

    /// Enable or disable rate limiting
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Per-key rate limiter backing the pipeline's rate-limit stage (C6, §4.5).
///
/// Distinct from [`RateLimiter`] above, which gates one backend's aggregate
/// throughput behind a single governor instance: this generalizes to one
/// governor instance per key, the same lazy-`DashMap` idiom
/// `identity::quota::QuotaStore` and `failsafe::Bulkhead` use, so a noisy
/// principal or tool cannot exhaust another's budget.
pub struct KeyedRateLimiter {
    limiters: DashMap<String, DirectLimiter>,
    requests_per_minute: u32,
}

impl KeyedRateLimiter {
    /// Allow up to `requests_per_minute` requests per distinct key.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        Self { limiters: DashMap::new(), requests_per_minute }
    }

    /// Check and record one request against `key`, returning an `overloaded`-
    /// sibling `rate-limited` error when `key` has exceeded its budget for
    /// the current window.
    pub fn check(&self, key: &str) -> Result<()> {
        let limiter = self.limiters.entry(key.to_string()).or_insert_with(|| {
            let quota = Quota::per_minute(NonZeroU32::new(self.requests_per_minute).unwrap_or(NonZeroU32::MIN));
            GovernorLimiter::direct(quota)
        });

        if limiter.check().is_ok() {
            Ok(())
        } else {
            Err(Error::RateLimited { message: format!("rate limit exceeded for '{key}'"), retry_after_secs: 60 })
        }
    }
}

#[cfg(test)]
mod keyed_tests {
    use super::*;

    #[test]
    fn distinct_keys_are_limited_independently() {
        let limiter = KeyedRateLimiter::new(1);
        assert!(limiter.check("alice:search").is_ok());
        assert!(limiter.check("alice:search").is_err());
        assert!(limiter.check("bob:search").is_ok(), "a different key must not share alice's budget");
    }

    #[test]
    fn exceeding_the_budget_surfaces_rate_limited_with_retry_after() {
        let limiter = KeyedRateLimiter::new(1);
        limiter.check("k").unwrap();
        let err = limiter.check("k").unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(err.retry_after_secs(), Some(60));
    }
}
