//! Analytics aggregation job.

use chrono::{DateTime, Utc};
use courier_db::entities::job::JobType;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::JobPayload;

/// Rollup bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

/// Job to roll up analytics over `[start_date, end_date)`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_range"))]
pub struct AnalyticsAggregationJob {
    pub granularity: Granularity,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

fn validate_range(job: &AnalyticsAggregationJob) -> Result<(), ValidationError> {
    if job.end_date < job.start_date {
        return Err(ValidationError::new("end_date_before_start_date"));
    }
    Ok(())
}

impl JobPayload for AnalyticsAggregationJob {
    const JOB_TYPE: JobType = JobType::AnalyticsAggregation;
}
