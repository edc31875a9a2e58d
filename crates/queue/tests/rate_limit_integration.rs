//! Rate limiter integration tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use courier_common::{AppError, AppResult};
use courier_queue::identity::{ANONYMOUS, identity_hash};
use courier_queue::{
    Clock, CounterStore, ManualClock, MemoryCounterStore, Quota, RateLimitResult, RateLimiter,
    resolve_identity,
};
use reqwest::header::{HeaderMap, HeaderValue};

/// A counter store whose backend is always down.
struct UnavailableStore;

#[async_trait]
impl CounterStore for UnavailableStore {
    async fn hit(
        &self,
        _key: &str,
        _limit: u32,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> AppResult<RateLimitResult> {
        Err(AppError::Database("connection refused".to_string()))
    }

    async fn delete_expired(&self, _now: DateTime<Utc>) -> AppResult<u64> {
        Err(AppError::Database("connection refused".to_string()))
    }
}

fn limiter() -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let limiter =
        RateLimiter::new(Arc::new(MemoryCounterStore::new())).with_clock(clock.clone());
    (limiter, clock)
}

#[tokio::test]
async fn test_window_exhaustion() {
    let (limiter, _) = limiter();
    let quota = Quota::new("subscribe", 5, Duration::seconds(60)).unwrap();

    for expected in [4, 3, 2, 1, 0] {
        let result = limiter.check_rate_limit("client", &quota).await;
        assert!(result.success);
        assert_eq!(result.remaining, expected);
        assert_eq!(result.limit, 5);
    }

    let denied = limiter.check_rate_limit("client", &quota).await;
    assert!(!denied.success);
    assert_eq!(denied.remaining, 0);
}

#[tokio::test]
async fn test_window_reset() {
    let (limiter, clock) = limiter();
    let quota = Quota::new("subscribe", 5, Duration::seconds(60)).unwrap();

    let first = limiter.check_rate_limit("client", &quota).await;
    for _ in 0..5 {
        limiter.check_rate_limit("client", &quota).await;
    }
    assert!(!limiter.check_rate_limit("client", &quota).await.success);

    clock.set(first.reset_at);
    let after = limiter.check_rate_limit("client", &quota).await;

    assert!(after.success);
    assert_eq!(after.remaining, 4);
    assert_eq!(after.reset_at, clock.now() + Duration::seconds(60));
}

#[tokio::test]
async fn test_scopes_and_identities_are_independent() {
    let (limiter, _) = limiter();
    let subscribe = Quota::new("subscribe", 1, Duration::seconds(60)).unwrap();
    let contact = Quota::new("contact", 1, Duration::seconds(60)).unwrap();

    assert!(limiter.check_rate_limit("a", &subscribe).await.success);
    assert!(!limiter.check_rate_limit("a", &subscribe).await.success);
    assert!(limiter.check_rate_limit("a", &contact).await.success);
    assert!(limiter.check_rate_limit("b", &subscribe).await.success);
}

#[tokio::test]
async fn test_fallback_when_store_is_down() {
    let clock = Arc::new(ManualClock::default());
    let fallback = MemoryCounterStore::new();
    let limiter = RateLimiter::new(Arc::new(UnavailableStore))
        .with_fallback(fallback.clone())
        .with_clock(clock);
    let quota = Quota::new("contact", 2, Duration::hours(1)).unwrap();

    assert!(limiter.check_rate_limit("client", &quota).await.success);
    assert!(limiter.check_rate_limit("client", &quota).await.success);
    assert!(!limiter.check_rate_limit("client", &quota).await.success);
    assert_eq!(fallback.len().await, 1);
}

#[tokio::test]
async fn test_sweep_survives_store_outage() {
    let clock = Arc::new(ManualClock::default());
    let limiter = RateLimiter::new(Arc::new(UnavailableStore)).with_clock(clock.clone());
    let quota = Quota::new("contact", 2, Duration::seconds(10)).unwrap();

    limiter.check_rate_limit("client", &quota).await;
    clock.advance(Duration::seconds(11));

    assert_eq!(limiter.sweep().await, 1);
}

#[test]
fn test_identity_is_deterministic() {
    let mut a = HeaderMap::new();
    a.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
    let mut b = HeaderMap::new();
    b.insert("x-forwarded-for", HeaderValue::from_static("5.6.7.8"));

    assert_eq!(resolve_identity(&a), resolve_identity(&a.clone()));
    assert_eq!(resolve_identity(&a), identity_hash("1.2.3.4"));
    assert_ne!(resolve_identity(&a), resolve_identity(&b));
    assert_eq!(resolve_identity(&HeaderMap::new()), ANONYMOUS);
}
