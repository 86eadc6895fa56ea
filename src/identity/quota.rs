//! Per-principal request quotas and retry budgets.
//!
//! Generalizes `failsafe::rate_limiter::RateLimiter`'s single governor
//! instance to one per tenant, held in a `DashMap` instead of a single
//! `Mutex<Option<_>>` slot, plus the daily/monthly counters and retry budget
//! the single-tenant rate limiter never needed.

use std::num::NonZeroU32;

use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovernorLimiter};

use super::tenant::TenantPolicy;

type DirectLimiter =
    GovernorLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Request may proceed.
    Allowed,
    /// Request exceeded its budget; retry after the given number of seconds.
    Exceeded {
        /// Suggested backoff before the caller retries, surfaced as a
        /// `Retry-After` header by the transport layer.
        retry_after_secs: u64,
    },
}

struct DayCounter {
    count: u64,
    day: u64,
}

struct MonthCounter {
    count: u64,
    month: u64,
}

/// Tracks per-principal request counters against a [`TenantPolicy`]'s
/// configured limits.
pub struct QuotaStore {
    per_minute: DashMap<String, DirectLimiter>,
    daily: DashMap<String, DayCounter>,
    monthly: DashMap<String, MonthCounter>,
}

impl Default for QuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaStore {
    /// Build an empty quota store; limiters are created lazily per tenant.
    #[must_use]
    pub fn new() -> Self {
        Self { per_minute: DashMap::new(), daily: DashMap::new(), monthly: DashMap::new() }
    }

    fn epoch_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Check and record one request against `tenant_id`'s policy, returning
    /// whether it may proceed.
    pub fn check(&self, tenant_id: &str, policy: &TenantPolicy) -> QuotaDecision {
        let now = Self::epoch_secs();
        let day = now / 86_400;
        let month = now / (86_400 * 30);

        {
            let mut counter = self
                .daily
                .entry(tenant_id.to_string())
                .or_insert_with(|| DayCounter { count: 0, day });
            if counter.day != day {
                counter.day = day;
                counter.count = 0;
            }
            if counter.count >= policy.requests_per_day {
                return QuotaDecision::Exceeded { retry_after_secs: 86_400 - (now % 86_400) };
            }
            counter.count += 1;
        }

        {
            let mut counter = self
                .monthly
                .entry(tenant_id.to_string())
                .or_insert_with(|| MonthCounter { count: 0, month });
            if counter.month != month {
                counter.month = month;
                counter.count = 0;
            }
            // 30 days * requests_per_day gives a simple monthly ceiling when
            // the operator has not configured one explicitly.
            let monthly_ceiling = policy.requests_per_day.saturating_mul(30);
            if counter.count >= monthly_ceiling {
                return QuotaDecision::Exceeded { retry_after_secs: 86_400 };
            }
            counter.count += 1;
        }

        let limiter = self.per_minute.entry(tenant_id.to_string()).or_insert_with(|| {
            let quota = Quota::per_minute(NonZeroU32::new(policy.requests_per_minute).unwrap_or(NonZeroU32::MIN));
            GovernorLimiter::direct(quota)
        });

        if limiter.check().is_ok() {
            QuotaDecision::Allowed
        } else {
            QuotaDecision::Exceeded { retry_after_secs: 60 }
        }
    }
}

/// Caps how many retries a single principal may issue across all requests
/// in a sliding window, preventing one misbehaving client's retry storm from
/// amplifying load on an already-struggling backend.
pub struct RetryBudget {
    limiters: DashMap<String, DirectLimiter>,
    retries_per_minute: u32,
}

impl RetryBudget {
    /// Allow up to `retries_per_minute` retries per principal.
    #[must_use]
    pub fn new(retries_per_minute: u32) -> Self {
        Self { limiters: DashMap::new(), retries_per_minute }
    }

    /// Whether `principal_id` may issue another retry right now.
    #[must_use]
    pub fn try_acquire(&self, principal_id: &str) -> bool {
        let limiter = self.limiters.entry(principal_id.to_string()).or_insert_with(|| {
            let quota = Quota::per_minute(NonZeroU32::new(self.retries_per_minute).unwrap_or(NonZeroU32::MIN));
            GovernorLimiter::direct(quota)
        });
        limiter.check().is_ok()
    }
}
