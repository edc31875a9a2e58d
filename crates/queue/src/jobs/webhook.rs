//! Webhook delivery job.

use std::collections::HashMap;

use courier_db::entities::job::JobType;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::JobPayload;

/// Job to POST a JSON body to an external URL once.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WebhookDeliveryJob {
    #[validate(url)]
    pub url: String,
    pub payload: serde_json::Value,
    /// Extra request headers. Every entry must be a legal HTTP header.
    #[serde(default)]
    #[validate(custom(function = "validate_headers"))]
    pub headers: HashMap<String, String>,
}

fn validate_headers(headers: &HashMap<String, String>) -> Result<(), ValidationError> {
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ValidationError::new("invalid_header_name"));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(ValidationError::new("invalid_header_value"));
        }
    }
    Ok(())
}

impl JobPayload for WebhookDeliveryJob {
    const JOB_TYPE: JobType = JobType::WebhookDelivery;
}
