//! Webhook delivery processor.

use std::time::Duration;

use async_trait::async_trait;
use courier_common::{AppError, AppResult};
use courier_db::entities::job::JobType;
use reqwest::Client;
use serde_json::Value;

use super::{Processor, http_client};
use crate::jobs::{self, WebhookDeliveryJob};

/// Processor for `webhook-delivery` jobs.
///
/// Makes exactly one POST per attempt. A non-2xx response fails the attempt.
#[derive(Clone)]
pub struct WebhookProcessor {
    http_client: Client,
}

impl WebhookProcessor {
    /// Create a new webhook processor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: http_client(Duration::from_secs(10)),
        }
    }
}

impl Default for WebhookProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for WebhookProcessor {
    fn job_type(&self) -> JobType {
        JobType::WebhookDelivery
    }

    async fn process(&self, payload: &Value) -> AppResult<()> {
        let job: WebhookDeliveryJob = jobs::decode(payload)?;

        let mut request = self
            .http_client
            .post(&job.url)
            .header("X-Courier-Event", "webhook-delivery")
            .json(&job.payload);
        for (name, value) in &job.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            AppError::ExternalService(format!("Webhook request to {} failed: {e}", job.url))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalService(format!(
                "Webhook {} returned {status}",
                job.url
            )));
        }

        tracing::info!(url = %job.url, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::processors::testing::serve;
    use axum::{Router, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::json;

    async fn receiver() -> String {
        serve(
            Router::new()
                .route(
                    "/ok",
                    post(|headers: HeaderMap| async move {
                        if headers.get("x-signature").is_some_and(|v| v == "abc123") {
                            StatusCode::NO_CONTENT
                        } else {
                            StatusCode::UNAUTHORIZED
                        }
                    }),
                )
                .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR })),
        )
        .await
    }

    #[tokio::test]
    async fn test_success_response_delivers() {
        let base = receiver().await;

        WebhookProcessor::new()
            .process(&json!({
                "url": format!("{base}/ok"),
                "payload": {"event": "signup"},
                "headers": {"x-signature": "abc123"},
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_response_fails_attempt() {
        let base = receiver().await;

        let err = WebhookProcessor::new()
            .process(&json!({"url": format!("{base}/fail"), "payload": {}}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));

        // Missing signature header: the receiver answers 401.
        let err = WebhookProcessor::new()
            .process(&json!({"url": format!("{base}/ok"), "payload": {}}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let processor = WebhookProcessor::new();

        let err = processor
            .process(&json!({"url": "not a url", "payload": {}}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails() {
        let processor = WebhookProcessor::new();

        // Port 9 (discard) on loopback is closed in test environments.
        let err = processor
            .process(&json!({"url": "http://127.0.0.1:9/hook", "payload": {"ok": true}}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
