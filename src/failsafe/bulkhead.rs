//! Per-(backend, tool) concurrency bulkhead (C10).
//!
//! `Backend::request` already gates concurrency per backend via its own
//! `Semaphore`; this module generalizes that to a finer grain so one noisy
//! tool on a backend cannot starve every other tool sharing that backend's
//! connection. Limits are created lazily, the same lazy-DashMap idiom
//! `identity::quota::QuotaStore` uses for per-tenant limiters.

use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{Error, Result};

/// Retry-after hint attached to an `overloaded` rejection. The bulkhead has
/// no notion of how long the backlog will take to drain, so it surfaces the
/// same short, fixed hint the circuit breaker's cooldown uses.
const OVERLOADED_RETRY_AFTER_SECS: u64 = 1;

/// Bounds concurrent in-flight calls per `backend:tool` key.
pub struct Bulkhead {
    limiters: DashMap<String, Arc<Semaphore>>,
    max_concurrent: NonZeroUsize,
}

impl Bulkhead {
    /// Allow up to `max_concurrent` simultaneous calls for any single
    /// `backend:tool` pair.
    #[must_use]
    pub fn new(max_concurrent: NonZeroUsize) -> Self {
        Self {
            limiters: DashMap::new(),
            max_concurrent,
        }
    }

    /// Acquire a permit for `key`, failing fast with `overloaded` instead of
    /// queuing when every permit is already checked out. A queued request
    /// can sit well past its deadline before a slot frees up; shedding load
    /// immediately lets the caller retry or fail cheaply instead.
    pub fn acquire(&self, key: &str) -> Result<OwnedSemaphorePermit> {
        let semaphore = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrent.get())))
            .clone();
        semaphore.try_acquire_owned().map_err(|_| Error::Overloaded {
            message: format!("bulkhead for '{key}' is saturated"),
            retry_after_secs: OVERLOADED_RETRY_AFTER_SECS,
        })
    }
}

impl Default for Bulkhead {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(16).unwrap())
    }
}
