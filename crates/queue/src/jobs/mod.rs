//! Job payload definitions.
//!
//! Each job type has one payload struct. Payloads are validated when a job
//! is enqueued and decoded again by the processor that runs it.

#![allow(missing_docs)]

mod analytics;
mod cache;
mod email;
mod export;
mod webhook;

pub use analytics::{AnalyticsAggregationJob, Granularity};
pub use cache::CacheInvalidationJob;
pub use email::EmailJob;
pub use export::{DataExportJob, ExportFormat};
pub use webhook::WebhookDeliveryJob;

use courier_common::{AppError, AppResult};
use courier_db::entities::job::JobType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

/// A typed job payload.
pub trait JobPayload: Serialize + DeserializeOwned + Validate + Send + Sync {
    /// The job type this payload belongs to.
    const JOB_TYPE: JobType;
}

/// Decode and validate a raw payload into its typed form.
pub fn decode<T: DeserializeOwned + Validate>(payload: &Value) -> AppResult<T> {
    let decoded: T = serde_json::from_value(payload.clone())?;
    decoded.validate()?;
    Ok(decoded)
}

/// Check that a raw payload is well-formed for the given job type.
pub fn validate_payload(job_type: JobType, payload: &Value) -> AppResult<()> {
    if !payload.is_object() {
        return Err(AppError::Validation(
            "Job payload must be a JSON object".to_string(),
        ));
    }

    match job_type {
        JobType::Email => decode::<EmailJob>(payload).map(drop),
        JobType::AnalyticsAggregation => decode::<AnalyticsAggregationJob>(payload).map(drop),
        JobType::CacheInvalidation => decode::<CacheInvalidationJob>(payload).map(drop),
        JobType::DataExport => decode::<DataExportJob>(payload).map(drop),
        JobType::WebhookDelivery => decode::<WebhookDeliveryJob>(payload).map(drop),
    }
}
