//! Fixed-window rate limiting for public write endpoints.
//!
//! Counters live in the durable store. When the store is unreachable the
//! limiter keeps answering from a process-local map, so admission control
//! never fails closed because of a database outage.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_common::config::QuotaConfig;
use courier_common::{AppError, AppResult};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::store::{CounterStore, MemoryCounterStore};

/// A quota: `limit` requests per `window`, counted separately per `scope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    /// Namespace for the counter key, e.g. `subscribe`.
    pub scope: String,
    /// Maximum requests per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
}

impl Quota {
    /// Create a new quota.
    ///
    /// The window must be positive: a zero-length window would reopen on
    /// every request and admit everything.
    pub fn new(scope: impl Into<String>, limit: u32, window: Duration) -> AppResult<Self> {
        let scope = scope.into();
        if window <= Duration::zero() {
            return Err(AppError::Validation(format!(
                "Rate limit window for {scope} must be positive"
            )));
        }
        Ok(Self {
            scope,
            limit,
            window,
        })
    }

    /// Build a quota from a configured `{limit, window_ms}` pair.
    pub fn from_config(scope: impl Into<String>, config: QuotaConfig) -> AppResult<Self> {
        let window_ms = i64::try_from(config.window_ms).map_err(|_| {
            AppError::Validation(format!("window_ms {} is out of range", config.window_ms))
        })?;
        Self::new(scope, config.limit, Duration::milliseconds(window_ms))
    }

    /// Counter key for an identity under this quota.
    #[must_use]
    pub fn key_for(&self, identity: &str) -> String {
        format!("{}:{}", self.scope, identity)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request is admitted.
    pub success: bool,
    /// The quota limit.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitResult {
    /// Window end as epoch milliseconds, the unit of `X-RateLimit-Reset`.
    #[must_use]
    pub fn reset_millis(&self) -> i64 {
        self.reset_at.timestamp_millis()
    }
}

/// A counter as stored: requests seen and when its window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    /// Requests counted in the window, never above the limit.
    pub count: u32,
    /// Window end.
    pub reset_at: DateTime<Utc>,
}

/// Apply one request to a counter.
///
/// Returns the decision and, when the counter changed, the value to write
/// back. A missing or expired counter opens a new window. Rejected requests
/// leave the stored count at the limit.
#[must_use]
pub fn apply_hit(
    existing: Option<Counter>,
    limit: u32,
    window: Duration,
    now: DateTime<Utc>,
) -> (RateLimitResult, Option<Counter>) {
    let current = existing
        .filter(|c| c.reset_at > now)
        .unwrap_or(Counter {
            count: 0,
            reset_at: now + window,
        });

    let count = current.count.saturating_add(1);
    if count > limit {
        let result = RateLimitResult {
            success: false,
            limit,
            remaining: 0,
            reset_at: current.reset_at,
        };
        // A fresh window still has to be recorded even when it rejects.
        let write = (existing != Some(current)).then_some(Counter {
            count: current.count.min(limit),
            reset_at: current.reset_at,
        });
        return (result, write);
    }

    let updated = Counter {
        count,
        reset_at: current.reset_at,
    };
    let result = RateLimitResult {
        success: true,
        limit,
        remaining: limit - count,
        reset_at: current.reset_at,
    };
    (result, Some(updated))
}

/// Rate limiter backed by a durable store with an in-memory fallback tier.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    fallback: MemoryCounterStore,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            fallback: MemoryCounterStore::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an existing fallback map, e.g. one shared with other limiters.
    #[must_use]
    pub fn with_fallback(mut self, fallback: MemoryCounterStore) -> Self {
        self.fallback = fallback;
        self
    }

    /// Current time on the limiter's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count one request from `identity` against `quota`.
    ///
    /// Never fails: a store error is logged and the same check runs
    /// against the fallback map.
    pub async fn check_rate_limit(&self, identity: &str, quota: &Quota) -> RateLimitResult {
        self.check_rate_limit_at(identity, quota, self.clock.now())
            .await
    }

    /// [`Self::check_rate_limit`] at an explicit instant.
    pub async fn check_rate_limit_at(
        &self,
        identity: &str,
        quota: &Quota,
        now: DateTime<Utc>,
    ) -> RateLimitResult {
        let key = quota.key_for(identity);

        match self.store.hit(&key, quota.limit, quota.window, now).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Rate limit store unavailable, using in-memory fallback"
                );
                self.fallback.hit_local(&key, quota.limit, quota.window, now).await
            }
        }
    }

    /// Drop expired counters from both tiers. Returns how many were removed.
    pub async fn sweep(&self) -> u64 {
        let now = self.clock.now();
        let local = self.fallback.sweep_local(now).await;

        match self.store.delete_expired(now).await {
            Ok(stored) => local + stored,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to sweep stored rate limit counters");
                local
            }
        }
    }
}
