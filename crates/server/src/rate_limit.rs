//! Rate limiting middleware for the public write endpoints.
//!
//! Each guarded route gets its own [`QuotaGuard`]. The caller identity comes
//! from the request's IP headers, and the quota outcome is reported in the
//! `X-RateLimit-*` headers whether or not the request is admitted.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use courier_queue::{Quota, RateLimitResult, RateLimiter, resolve_identity};
use serde_json::json;

/// Quota limit header.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
/// Requests left in the window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Window end, epoch milliseconds.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Middleware state: one limiter checked against one quota.
#[derive(Clone)]
pub struct QuotaGuard {
    limiter: RateLimiter,
    quota: Quota,
}

impl QuotaGuard {
    /// Create a new guard.
    #[must_use]
    pub const fn new(limiter: RateLimiter, quota: Quota) -> Self {
        Self { limiter, quota }
    }
}

/// Write the `X-RateLimit-*` headers for a result.
pub fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(result.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(result.reset_millis()));
}

/// Rejected request.
#[derive(Debug)]
pub struct RateLimitError {
    /// The denying check.
    pub result: RateLimitResult,
    /// Seconds until the window resets.
    pub retry_after: i64,
}

impl RateLimitError {
    /// Build a rejection, measuring the wait from `now` on the limiter's clock.
    #[must_use]
    pub fn new(result: RateLimitResult, now: DateTime<Utc>) -> Self {
        let retry_after = (result.reset_at - now).num_seconds().max(0);
        Self {
            result,
            retry_after,
        }
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after;
        let body = json!({
            "error": {
                "code": "RATE_LIMITED",
                "message": "Too many requests",
                "retryAfter": retry_after,
            }
        });

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        apply_headers(headers, &self.result);
        headers.insert("retry-after", HeaderValue::from(retry_after));
        response
    }
}

/// Admit or reject a request against the guard's quota.
pub async fn enforce_quota(
    State(guard): State<QuotaGuard>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    let identity = resolve_identity(req.headers());
    let result = guard
        .limiter
        .check_rate_limit(&identity, &guard.quota)
        .await;

    if !result.success {
        tracing::debug!(scope = %guard.quota.scope, identity = %identity, "Rate limit exceeded");
        return Err(RateLimitError::new(result, guard.limiter.now()));
    }

    let mut response = next.run(req).await;
    apply_headers(response.headers_mut(), &result);
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result(success: bool, remaining: u32) -> RateLimitResult {
        RateLimitResult {
            success,
            limit: 5,
            remaining,
            reset_at: Utc::now() + Duration::seconds(30),
        }
    }

    #[test]
    fn test_headers_are_string_encoded() {
        let result = result(true, 4);
        let mut headers = HeaderMap::new();
        apply_headers(&mut headers, &result);

        assert_eq!(headers[LIMIT_HEADER], "5");
        assert_eq!(headers[REMAINING_HEADER], "4");
        assert_eq!(
            headers[RESET_HEADER].to_str().unwrap(),
            result.reset_millis().to_string()
        );
    }

    #[test]
    fn test_rejection_carries_headers() {
        let response = RateLimitError::new(result(false, 0), Utc::now()).into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[REMAINING_HEADER], "0");
        assert!(response.headers().contains_key("retry-after"));
    }

    #[test]
    fn test_retry_after_uses_given_clock() {
        let now = Utc::now() - Duration::days(365);
        let result = RateLimitResult {
            success: false,
            limit: 5,
            remaining: 0,
            reset_at: now + Duration::seconds(30),
        };

        let response = RateLimitError::new(result, now).into_response();

        assert_eq!(response.headers()["retry-after"], "30");
    }

    #[test]
    fn test_retry_after_never_negative() {
        let now = Utc::now();
        let result = RateLimitResult {
            success: false,
            limit: 5,
            remaining: 0,
            reset_at: now - Duration::seconds(10),
        };

        assert_eq!(RateLimitError::new(result, now).retry_after, 0);
    }
}
