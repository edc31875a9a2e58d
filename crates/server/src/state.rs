//! Shared handler state.

use std::sync::Arc;

use courier_common::{AppResult, Config, LocalStorage};
use courier_queue::processors::{
    AggregationProcessor, CacheInvalidationProcessor, DataExportProcessor, EmailProcessor,
    HttpEmailSender, RollupLedger, StoreDatasetSource, WebhookProcessor,
};
use courier_queue::{
    JobQueue, JobStore, ProcessorRegistry, Quota, RateLimiter, SequenceStore, SequenceTracker,
};

/// Quotas for the public write endpoints.
#[derive(Debug, Clone)]
pub struct Quotas {
    /// Newsletter signup.
    pub subscribe: Quota,
    /// Contact form.
    pub contact: Quota,
}

impl Quotas {
    /// Build the quotas from configuration.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(Self {
            subscribe: Quota::from_config("subscribe", config.rate_limit.subscribe)?,
            contact: Quota::from_config("contact", config.rate_limit.contact)?,
        })
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Job queue.
    pub queue: JobQueue,
    /// Processors used by the dispatch trigger.
    pub registry: Arc<ProcessorRegistry>,
    /// Admission control for the write endpoints.
    pub limiter: RateLimiter,
    /// Drip sequence bookkeeping.
    pub sequences: SequenceTracker,
    /// Per-endpoint quotas.
    pub quotas: Quotas,
    /// Bearer token for the trigger endpoints. Unset disables them.
    pub cron_secret: Option<String>,
    /// Where contact form messages are delivered.
    pub contact_inbox: String,
    /// Jobs claimed per dispatch trigger.
    pub batch_size: u64,
    /// Age in days past which cleanup deletes finished jobs.
    pub retention_days: u32,
}

impl AppState {
    /// Assemble handler state from built components.
    pub fn new(
        config: &Config,
        queue: JobQueue,
        registry: Arc<ProcessorRegistry>,
        limiter: RateLimiter,
        sequences: SequenceTracker,
    ) -> AppResult<Self> {
        Ok(Self {
            queue,
            registry,
            limiter,
            sequences,
            quotas: Quotas::from_config(config)?,
            cron_secret: config.cron.secret.clone(),
            contact_inbox: config.email.from_address.clone(),
            batch_size: config.dispatcher.batch_size,
            retention_days: config.dispatcher.retention_days,
        })
    }
}

/// Register a processor for every job type.
#[must_use]
pub fn build_registry(
    config: &Config,
    sequences: Arc<dyn SequenceStore>,
    jobs: Arc<dyn JobStore>,
) -> ProcessorRegistry {
    let sender = Arc::new(HttpEmailSender::new(config.email.clone()));
    if !sender.is_enabled() {
        tracing::warn!("Email API key not set; email jobs will fail until it is configured");
    }

    let storage = Arc::new(LocalStorage::new(
        config.storage.export_dir.clone(),
        config.storage.base_url.clone(),
    ));
    let source = Arc::new(StoreDatasetSource::new(sequences, jobs));

    ProcessorRegistry::new()
        .with(Arc::new(EmailProcessor::new(sender.clone())))
        .with(Arc::new(AggregationProcessor::new(Arc::new(
            RollupLedger::new(),
        ))))
        .with(Arc::new(CacheInvalidationProcessor::new(config.cache.clone())))
        .with(Arc::new(DataExportProcessor::new(source, storage, sender)))
        .with(Arc::new(WebhookProcessor::new()))
}
