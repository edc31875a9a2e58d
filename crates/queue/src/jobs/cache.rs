//! Cache invalidation job.

use courier_db::entities::job::JobType;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::JobPayload;

/// Job to invalidate rendered pages by path and/or tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CacheInvalidationJob {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CacheInvalidationJob {
    /// Whether there is nothing to invalidate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.tags.is_empty()
    }
}

impl JobPayload for CacheInvalidationJob {
    const JOB_TYPE: JobType = JobType::CacheInvalidation;
}
