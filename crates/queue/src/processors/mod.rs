//! Job processors.
//!
//! A processor runs the payload of one job type. It reports failure by
//! returning an error; retrying is the dispatcher's job, never the
//! processor's.

mod analytics;
mod cache;
mod email;
mod export;
mod webhook;

pub use analytics::{AggregationProcessor, Aggregator, RollupLedger, buckets};
pub use cache::CacheInvalidationProcessor;
pub use email::{EmailProcessor, EmailSender, HttpEmailSender};
pub use export::{DataExportProcessor, DatasetSource, Row, StoreDatasetSource, render};
pub use webhook::WebhookProcessor;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::AppResult;
use courier_db::entities::job::JobType;
use reqwest::Client;
use serde_json::Value;

/// Executes the payload of one job type.
#[async_trait]
pub trait Processor: Send + Sync {
    /// The job type handled.
    fn job_type(&self) -> JobType;

    /// Run one attempt.
    async fn process(&self, payload: &Value) -> AppResult<()>;
}

/// Mapping from job type to processor.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<JobType, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under its job type, replacing any previous one.
    #[must_use]
    pub fn with(mut self, processor: Arc<dyn Processor>) -> Self {
        self.register(processor);
        self
    }

    /// Register a processor under its job type, replacing any previous one.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.job_type(), processor);
    }

    /// Processor for a job type.
    #[must_use]
    pub fn get(&self, job_type: JobType) -> Option<&Arc<dyn Processor>> {
        self.processors.get(&job_type)
    }

    /// Registered job types.
    #[must_use]
    pub fn job_types(&self) -> Vec<JobType> {
        self.processors.keys().copied().collect()
    }
}

/// HTTP client for outbound processor calls.
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            Client::new()
        })
}
