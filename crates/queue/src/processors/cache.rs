//! Cache invalidation processor.

use std::time::Duration;

use async_trait::async_trait;
use courier_common::config::CacheConfig;
use courier_common::{AppError, AppResult};
use courier_db::entities::job::JobType;
use reqwest::Client;
use serde_json::{Value, json};

use super::{Processor, http_client};
use crate::jobs::{self, CacheInvalidationJob};

/// Processor for `cache-invalidation` jobs.
///
/// Each path and each tag is one POST to the rendering layer's
/// revalidation endpoint.
#[derive(Clone)]
pub struct CacheInvalidationProcessor {
    config: CacheConfig,
    http_client: Client,
}

impl CacheInvalidationProcessor {
    /// Create a new cache invalidation processor.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            http_client: http_client(Duration::from_secs(10)),
        }
    }

    async fn revalidate(&self, endpoint: &str, body: Value) -> AppResult<()> {
        let mut request = self.http_client.post(endpoint).json(&body);
        if let Some(secret) = &self.config.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Revalidation request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Revalidation of {body} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for CacheInvalidationProcessor {
    fn job_type(&self) -> JobType {
        JobType::CacheInvalidation
    }

    async fn process(&self, payload: &Value) -> AppResult<()> {
        let job: CacheInvalidationJob = jobs::decode(payload)?;
        if job.is_empty() {
            return Ok(());
        }

        let endpoint = self.config.revalidate_url.as_deref().ok_or_else(|| {
            AppError::Processor("Cache revalidation endpoint not configured".to_string())
        })?;

        for path in &job.paths {
            self.revalidate(endpoint, json!({ "path": path })).await?;
        }
        for tag in &job.tags {
            self.revalidate(endpoint, json!({ "tag": tag })).await?;
        }

        tracing::info!(
            paths = job.paths.len(),
            tags = job.tags.len(),
            "Cache invalidated"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::processors::testing::serve;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

    async fn revalidator(hits: Arc<AtomicUsize>) -> String {
        serve(
            Router::new()
                .route(
                    "/revalidate",
                    post(|State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        if body.get("tag").is_some_and(|t| t == "broken") {
                            StatusCode::INTERNAL_SERVER_ERROR
                        } else {
                            StatusCode::OK
                        }
                    }),
                )
                .with_state(hits),
        )
        .await
    }

    fn processor(base: &str) -> CacheInvalidationProcessor {
        CacheInvalidationProcessor::new(CacheConfig {
            revalidate_url: Some(format!("{base}/revalidate")),
            secret: Some("s3cret".to_string()),
        })
    }

    #[tokio::test]
    async fn test_posts_once_per_path_and_tag() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = revalidator(hits.clone()).await;

        processor(&base)
            .process(&json!({"paths": ["/", "/blog"], "tags": ["posts"]}))
            .await
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_revalidation_fails() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = revalidator(hits.clone()).await;

        let err = processor(&base)
            .process(&json!({"tags": ["broken"]}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalService(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_is_noop() {
        // No endpoint configured: a non-empty payload would fail.
        let processor = CacheInvalidationProcessor::new(CacheConfig::default());

        processor.process(&json!({})).await.unwrap();
        processor
            .process(&json!({"paths": [], "tags": []}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_fails() {
        let processor = CacheInvalidationProcessor::new(CacheConfig::default());

        let err = processor
            .process(&json!({"paths": ["/blog"]}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Processor(_)));
    }
}
